//! # Turn Orchestration
//!
//! One user utterance in, one assistant reply out. The orchestrator owns the
//! ordering contract: the user turn is persisted before generation runs, and
//! the assistant turn is persisted before any synthesis is attempted, so a
//! late synthesis failure never loses conversation state.

use std::sync::Arc;

use crate::capability::CapabilityError;
use crate::chat::history::{Role, SessionStore};
use crate::llm::GenerationOrchestrator;
use crate::tts::SynthService;

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Session the turn landed in (newly minted when none was supplied)
    pub session_id: String,

    /// The assistant's reply text
    pub reply: String,

    /// Synthesized WAV bytes, when audio was requested
    pub audio: Option<Vec<u8>>,
}

pub struct TurnOrchestrator {
    store: Arc<SessionStore>,
    generator: Arc<GenerationOrchestrator>,
    synth: Arc<SynthService>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        generator: Arc<GenerationOrchestrator>,
        synth: Arc<SynthService>,
    ) -> Self {
        Self {
            store,
            generator,
            synth,
        }
    }

    /// Run one conversation turn.
    ///
    /// ## Flow:
    /// 1. Resolve the session (create one when absent)
    /// 2. Read prior history, then persist the user turn
    /// 3. Generate the reply from prior history + the new utterance
    /// 4. Persist the assistant turn
    /// 5. Optionally synthesize the reply to audio
    ///
    /// A generation failure leaves the user turn in place; a synthesis
    /// failure leaves both turns in place.
    pub async fn handle_turn(
        &self,
        session_id: Option<String>,
        text: &str,
        wants_audio: bool,
    ) -> Result<TurnOutcome, CapabilityError> {
        let session_id = match session_id {
            Some(id) => id,
            None => self.store.create_session().await,
        };

        let history = self.store.read(&session_id).await;
        self.store
            .append(&session_id, Role::User, text.to_string())
            .await;

        let reply = self.generator.reply(&history, text).await?;

        self.store
            .append(&session_id, Role::Assistant, reply.clone())
            .await;

        let audio = if wants_audio {
            Some(self.synth.synthesize(&reply).await?)
        } else {
            None
        };

        Ok(TurnOutcome {
            session_id,
            reply,
            audio,
        })
    }
}
