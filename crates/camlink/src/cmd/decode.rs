use std::fs::File;
use std::io::{self, Read};

use camlink_frame::{FrameConfig, FrameReader};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = FrameConfig::default();
    if let Some(max) = args.max_payload {
        config.max_payload_size = max;
    }

    match &args.path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("open {}", path.display()), err))?;
            dump(file, config, format)
        }
        None => dump(io::stdin().lock(), config, format),
    }
}

fn dump<R: Read>(input: R, config: FrameConfig, format: OutputFormat) -> CliResult<i32> {
    let mut reader = FrameReader::with_config(input, config);
    for frame in reader.frames() {
        let frame = frame.map_err(|err| frame_error("decode failed", err))?;
        print_frame(&frame, None, None, format);
    }
    Ok(SUCCESS)
}
