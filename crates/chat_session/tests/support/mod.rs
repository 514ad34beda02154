//! Scripted response generators shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chat_session::{GeneratedResponse, GenerationError, PromptTurn, ResponseGenerator};
use tokio::sync::{mpsc, oneshot};

/// Replays scripted outcomes in order, then echoes the last prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    outcomes: Mutex<VecDeque<Result<GeneratedResponse, GenerationError>>>,
    calls: Mutex<Vec<Vec<PromptTurn>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_outcomes(
        outcomes: impl IntoIterator<Item = Result<GeneratedResponse, GenerationError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<PromptTurn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        turns: &[PromptTurn],
        model: Option<&str>,
    ) -> Result<GeneratedResponse, GenerationError> {
        self.calls.lock().unwrap().push(turns.to_vec());
        if let Some(outcome) = self.outcomes.lock().unwrap().pop_front() {
            return outcome;
        }
        let last = turns.last().map(|turn| turn.text.as_str()).unwrap_or("");
        Ok(GeneratedResponse::new(
            format!("echo: {last}"),
            model.unwrap_or("scripted-model"),
        ))
    }
}

/// Blocks every call until the test releases it.
///
/// Each call announces itself on `started` with the prompt it received and
/// then waits for the next queued release channel.
pub struct GatedGenerator {
    releases: Mutex<VecDeque<oneshot::Receiver<GeneratedResponse>>>,
    started: mpsc::UnboundedSender<Vec<PromptTurn>>,
}

pub struct Gate {
    senders: VecDeque<oneshot::Sender<GeneratedResponse>>,
    pub started: mpsc::UnboundedReceiver<Vec<PromptTurn>>,
}

impl Gate {
    /// Release the oldest pending call still waiting on the gate.
    pub fn release(&mut self, text: &str) {
        let sender = self.senders.pop_front().expect("no gated call left");
        sender
            .send(GeneratedResponse::new(text, "gated-model"))
            .expect("gated call dropped");
    }

    /// Release a specific pending call, counted among those not yet released.
    pub fn release_at(&mut self, index: usize, text: &str) {
        let sender = self.senders.remove(index).expect("no gated call at index");
        sender
            .send(GeneratedResponse::new(text, "gated-model"))
            .expect("gated call dropped");
    }

    pub async fn wait_started(&mut self) -> Vec<PromptTurn> {
        self.started.recv().await.expect("generator dropped")
    }
}

impl GatedGenerator {
    pub fn new(calls: usize) -> (Arc<Self>, Gate) {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let mut senders = VecDeque::new();
        let mut receivers = VecDeque::new();
        for _ in 0..calls {
            let (tx, rx) = oneshot::channel();
            senders.push_back(tx);
            receivers.push_back(rx);
        }
        (
            Arc::new(Self {
                releases: Mutex::new(receivers),
                started: started_tx,
            }),
            Gate {
                senders,
                started: started_rx,
            },
        )
    }
}

#[async_trait]
impl ResponseGenerator for GatedGenerator {
    async fn generate(
        &self,
        turns: &[PromptTurn],
        _model: Option<&str>,
    ) -> Result<GeneratedResponse, GenerationError> {
        let release = self.releases.lock().unwrap().pop_front();
        let _ = self.started.send(turns.to_vec());
        match release {
            Some(release) => release
                .await
                .map_err(|_| GenerationError::Provider("gate closed".to_string())),
            None => Err(GenerationError::Provider("no gated call left".to_string())),
        }
    }
}

/// Never answers.
pub struct StalledGenerator;

#[async_trait]
impl ResponseGenerator for StalledGenerator {
    async fn generate(
        &self,
        _turns: &[PromptTurn],
        _model: Option<&str>,
    ) -> Result<GeneratedResponse, GenerationError> {
        std::future::pending().await
    }
}
