//! Routes live store batches through the reconciliation engine.

use chatline_shared::store::LiveEvent;

use crate::timeline::Timeline;

/// What the session should signal after a live batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveOutcome {
    pub applied: usize,
    /// Conversations held back until their attachments are uploaded.
    pub deferred: usize,
    pub reload: bool,
    pub scroll_to_bottom: bool,
}

/// Apply one batch. Changed events carry no ordering guard: the last batch
/// applied wins.
pub fn dispatch(timeline: &mut Timeline, event: LiveEvent) -> LiveOutcome {
    let mut outcome = LiveOutcome::default();
    match event {
        LiveEvent::Posted(conversations) | LiveEvent::Changed(conversations) => {
            for conversation in conversations {
                timeline.upsert(conversation);
                outcome.applied += 1;
            }
            outcome.reload = true;
        }
        LiveEvent::New(conversations) => {
            for conversation in conversations {
                if conversation.media_ready() {
                    timeline.upsert(conversation);
                    outcome.applied += 1;
                } else {
                    outcome.deferred += 1;
                }
            }
            outcome.scroll_to_bottom = outcome.applied > 0;
        }
    }
    outcome
}
