//! The raw engine event vocabulary and its boundary normalization.
//!
//! The execution engine has no single canonical "message complete" signal:
//! completion may arrive as any of four distinct finish shapes, often
//! redundantly for the same logical turn. All of them are normalized here
//! into one [`FlushTrigger`], so the attribution engine has exactly one
//! flush code path with one idempotence guard.

use crate::{EntryMetadata, IdentityHints};
use serde::{Deserialize, Serialize};

/// A low-level event emitted by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// An agent turn is beginning.
    TurnStarted {
        #[serde(flatten)]
        hints: IdentityHints,
    },

    /// An incremental chunk of agent output.
    TextDelta {
        #[serde(flatten)]
        hints: IdentityHints,
        text: String,
    },

    /// Finish shape 1: the message-level completion marker.
    MessageCompleted {
        #[serde(flatten)]
        hints: IdentityHints,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<EntryMetadata>,
    },

    /// Finish shape 2: the turn-level completion marker.
    TurnCompleted {
        #[serde(flatten)]
        hints: IdentityHints,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<EntryMetadata>,
    },

    /// Finish shape 3: the agent-level completion marker.
    AgentFinished {
        #[serde(flatten)]
        hints: IdentityHints,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<EntryMetadata>,
    },

    /// Finish shape 4: the step-level completion marker.
    StepClosed {
        #[serde(flatten)]
        hints: IdentityHints,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<EntryMetadata>,
    },

    /// Inter-agent handoff; describes routing rather than content.
    Handoff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

/// Which signal caused a buffer flush. Names the originating finish shape
/// so diagnostics can tell redundant shapes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    MessageCompleted,
    TurnCompleted,
    AgentFinished,
    StepClosed,
    /// The raw feed itself ended; used by the end-of-stream sweep.
    StreamEnd,
}

impl FlushTrigger {
    /// Short label for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::MessageCompleted => "message_completed",
            FlushTrigger::TurnCompleted => "turn_completed",
            FlushTrigger::AgentFinished => "agent_finished",
            FlushTrigger::StepClosed => "step_closed",
            FlushTrigger::StreamEnd => "stream_end",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw event normalized for consumption by the attribution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// An agent turn is beginning.
    TurnStart(IdentityHints),
    /// Incremental text to accumulate.
    Delta(IdentityHints, String),
    /// Flush the current buffer, whatever finish shape said so.
    Flush {
        hints: IdentityHints,
        trigger: FlushTrigger,
        metadata: Option<EntryMetadata>,
    },
    /// Inter-agent handoff, to be surfaced as an internal entry.
    Handoff {
        from: Option<String>,
        to: Option<String>,
        note: Option<String>,
    },
}

impl RawEvent {
    /// Collapses the redundant upstream shapes into one internal signal.
    pub fn normalize(self) -> Signal {
        match self {
            RawEvent::TurnStarted { hints } => Signal::TurnStart(hints),
            RawEvent::TextDelta { hints, text } => Signal::Delta(hints, text),
            RawEvent::MessageCompleted { hints, metadata } => Signal::Flush {
                hints,
                trigger: FlushTrigger::MessageCompleted,
                metadata,
            },
            RawEvent::TurnCompleted { hints, metadata } => Signal::Flush {
                hints,
                trigger: FlushTrigger::TurnCompleted,
                metadata,
            },
            RawEvent::AgentFinished { hints, metadata } => Signal::Flush {
                hints,
                trigger: FlushTrigger::AgentFinished,
                metadata,
            },
            RawEvent::StepClosed { hints, metadata } => Signal::Flush {
                hints,
                trigger: FlushTrigger::StepClosed,
                metadata,
            },
            RawEvent::Handoff { from, to, note } => Signal::Handoff { from, to, note },
        }
    }

    /// Convenience constructor: a turn start with an explicit agent id.
    pub fn turn_started(agent_id: impl Into<String>) -> Self {
        RawEvent::TurnStarted {
            hints: IdentityHints {
                agent_id: Some(agent_id.into()),
                ..IdentityHints::default()
            },
        }
    }

    /// Convenience constructor: an anonymous text delta.
    pub fn delta(text: impl Into<String>) -> Self {
        RawEvent::TextDelta {
            hints: IdentityHints::default(),
            text: text.into(),
        }
    }

    /// Convenience constructor: an anonymous turn-finished marker.
    pub fn turn_finished() -> Self {
        RawEvent::TurnCompleted {
            hints: IdentityHints::default(),
            metadata: None,
        }
    }
}
