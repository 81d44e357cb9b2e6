//! Reconnection policy.
//!
//! The policy only decides *what* to reconnect and in which order; the
//! session coordinator performs the attempts. Nothing is retried without the
//! user confirming a prompt first.

use std::collections::BTreeSet;
use std::fmt;

use crate::kind::ChannelKind;

/// Which links were lost, as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LostChannels {
    MirroringOnly,
    RemoteOnly,
    Both,
}

impl LostChannels {
    pub fn classify(targets: &BTreeSet<ChannelKind>) -> Option<Self> {
        let mirroring = targets.contains(&ChannelKind::Mirroring);
        let remote = targets.contains(&ChannelKind::Remote);
        match (mirroring, remote) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::MirroringOnly),
            (false, true) => Some(Self::RemoteOnly),
            (false, false) => None,
        }
    }

    /// Channels to re-establish, in the order they are attempted.
    pub fn channels(self) -> &'static [ChannelKind] {
        match self {
            Self::MirroringOnly => &[ChannelKind::Mirroring],
            Self::RemoteOnly => &[ChannelKind::Remote],
            Self::Both => &[ChannelKind::Mirroring, ChannelKind::Remote],
        }
    }

    /// Prompt text.
    pub fn describe(self) -> &'static str {
        match self {
            Self::MirroringOnly => "Connection to the display device was lost.",
            Self::RemoteOnly => "Connection to the remote controller was lost.",
            Self::Both => "Connections to the display device and the remote controller were lost.",
        }
    }
}

impl fmt::Display for LostChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MirroringOnly => "mirroring",
            Self::RemoteOnly => "remote",
            Self::Both => "mirroring+remote",
        })
    }
}

/// Channels still waiting to be re-established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectionRequest {
    targets: BTreeSet<ChannelKind>,
    /// Targets the user has agreed to reconnect.
    confirmed: BTreeSet<ChannelKind>,
}

impl ReconnectionRequest {
    pub fn targets(&self) -> &BTreeSet<ChannelKind> {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn lost(&self) -> Option<LostChannels> {
        LostChannels::classify(&self.targets)
    }

    /// Next channel to attempt (mirroring before remote).
    pub fn next(&self) -> Option<ChannelKind> {
        self.targets.first().copied()
    }

    /// Whether some target has not been confirmed yet.
    pub fn awaiting_answer(&self) -> bool {
        !self.targets.is_subset(&self.confirmed)
    }

    fn next_confirmed(&self) -> Option<ChannelKind> {
        self.targets.intersection(&self.confirmed).next().copied()
    }

    fn insert(&mut self, channel: ChannelKind) {
        self.targets.insert(channel);
        self.confirmed.remove(&channel);
    }

    fn remove(&mut self, channel: ChannelKind) -> bool {
        self.confirmed.remove(&channel);
        self.targets.remove(&channel)
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.confirmed.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyState {
    #[default]
    Idle,
    AwaitingUserConfirmation,
    Reconnecting(ChannelKind),
}

/// Result of the user accepting a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Start reconnecting this channel now.
    Start(ChannelKind),
    /// An attempt is already running; the newly confirmed targets follow it.
    Queued,
}

/// What the coordinator should do after a channel came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStep {
    /// Start reconnecting the next confirmed target.
    Reconnect(ChannelKind),
    /// Targets remain that the user has not confirmed; ask again.
    Prompt(LostChannels),
    /// Every lost channel is back.
    Complete,
    /// Nothing changes.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ReconnectionPolicy {
    state: PolicyState,
    request: ReconnectionRequest,
}

impl ReconnectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn request(&self) -> &ReconnectionRequest {
        &self.request
    }

    /// Pending classification, if anything is lost.
    pub fn pending(&self) -> Option<LostChannels> {
        self.request.lost()
    }

    /// A connected channel failed. Returns the classification to prompt with.
    ///
    /// Every loss is prompted. While an attempt for another channel is
    /// running that attempt carries on, but the new channel is only
    /// reconnected once the user confirms.
    pub fn record_failure(&mut self, channel: ChannelKind) -> Option<LostChannels> {
        self.request.insert(channel);
        match self.state {
            PolicyState::Reconnecting(current) if current != channel => {}
            _ => {
                self.request.confirmed.clear();
                self.state = PolicyState::AwaitingUserConfirmation;
            }
        }
        self.request.lost()
    }

    /// The user accepted the outstanding prompt.
    pub fn confirm(&mut self) -> Option<Confirmation> {
        match self.state {
            PolicyState::Idle => None,
            PolicyState::AwaitingUserConfirmation => {
                let next = self.request.next()?;
                self.request.confirmed = self.request.targets.clone();
                self.state = PolicyState::Reconnecting(next);
                Some(Confirmation::Start(next))
            }
            PolicyState::Reconnecting(_) if self.request.awaiting_answer() => {
                self.request.confirmed = self.request.targets.clone();
                Some(Confirmation::Queued)
            }
            PolicyState::Reconnecting(_) => None,
        }
    }

    /// `channel` is connected again.
    pub fn reconnected(&mut self, channel: ChannelKind) -> PolicyStep {
        if !self.request.remove(channel) {
            return PolicyStep::Unchanged;
        }
        if self.request.is_empty() {
            self.state = PolicyState::Idle;
            return PolicyStep::Complete;
        }
        if self.state != PolicyState::Reconnecting(channel) {
            return PolicyStep::Unchanged;
        }
        if let Some(next) = self.request.next_confirmed() {
            self.state = PolicyState::Reconnecting(next);
            return PolicyStep::Reconnect(next);
        }
        self.state = PolicyState::AwaitingUserConfirmation;
        match self.request.lost() {
            Some(lost) => PolicyStep::Prompt(lost),
            None => PolicyStep::Unchanged,
        }
    }

    /// The attempt for `channel` failed. Returns the classification to
    /// re-prompt with.
    pub fn reconnect_failed(&mut self, channel: ChannelKind) -> Option<LostChannels> {
        if self.state != PolicyState::Reconnecting(channel) {
            return None;
        }
        self.request.insert(channel);
        self.request.confirmed.clear();
        self.state = PolicyState::AwaitingUserConfirmation;
        self.request.lost()
    }

    /// Drop every target. Returns whether anything was pending.
    pub fn cancel(&mut self) -> bool {
        let pending = self.state != PolicyState::Idle || !self.request.is_empty();
        self.request.clear();
        self.state = PolicyState::Idle;
        pending
    }

    /// The user explicitly disconnected `channel`; stop trying to restore it.
    ///
    /// Returns a classification to re-prompt with when an in-flight attempt
    /// for `channel` was abandoned and other channels are still lost.
    pub fn forget(&mut self, channel: ChannelKind) -> Option<LostChannels> {
        self.request.remove(channel);
        if self.request.is_empty() {
            self.state = PolicyState::Idle;
            return None;
        }
        if self.state == PolicyState::Reconnecting(channel) {
            self.request.confirmed.clear();
            self.state = PolicyState::AwaitingUserConfirmation;
            return self.request.lost();
        }
        None
    }
}
