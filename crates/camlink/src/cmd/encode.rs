use std::fs::File;
use std::io::{self, Write};

use camlink_frame::FrameWriter;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let payload = args.payload.resolve()?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|err| io_error(&format!("create {}", path.display()), err))?;
            write_frame(file, &args, &payload)?;
        }
        None => write_frame(io::stdout().lock(), &args, &payload)?,
    }

    Ok(SUCCESS)
}

fn write_frame<W: Write>(out: W, args: &EncodeArgs, payload: &[u8]) -> CliResult<()> {
    FrameWriter::new(out)
        .send(args.kind, payload)
        .map_err(|err| frame_error("encode failed", err))
}
