// Test support utilities for both unit and integration tests

use crate::engine::{MediaEngine, SeekId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A call the controller made on the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load(String),
    Unload,
    SetRate(f32),
    Seek(Duration, SeekId),
}

#[derive(Default)]
struct ScriptedState {
    calls: Vec<EngineCall>,
    rate: f32,
    current_time: Duration,
    duration: Option<Duration>,
}

/// Engine double that records every call and never reports anything on its
/// own. Tests decide when and in which order engine events arrive.
///
/// Clones share state, so a test can keep one clone while the controller
/// owns another.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap()
    }

    /// Duration the engine reports once asked
    pub fn set_duration(&self, duration: Option<Duration>) {
        self.state().duration = duration;
    }

    pub fn set_current_time(&self, time: Duration) {
        self.state().current_time = time;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Return and forget the calls recorded so far
    pub fn take_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn seeks(&self) -> Vec<(Duration, SeekId)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Seek(target, id) => Some((*target, *id)),
                _ => None,
            })
            .collect()
    }

    pub fn last_seek(&self) -> Option<SeekId> {
        self.seeks().last().map(|(_, id)| *id)
    }
}

impl MediaEngine for ScriptedEngine {
    fn load(&mut self, url: &str) {
        let mut state = self.state();
        state.calls.push(EngineCall::Load(url.to_string()));
        state.rate = 0.0;
        state.current_time = Duration::ZERO;
    }

    fn unload(&mut self) {
        let mut state = self.state();
        state.calls.push(EngineCall::Unload);
        state.rate = 0.0;
    }

    fn rate(&self) -> f32 {
        self.state().rate
    }

    fn set_rate(&mut self, rate: f32) {
        let mut state = self.state();
        state.calls.push(EngineCall::SetRate(rate));
        state.rate = rate;
    }

    fn current_time(&self) -> Duration {
        self.state().current_time
    }

    fn duration(&self) -> Option<Duration> {
        self.state().duration
    }

    fn seek(&mut self, target: Duration, id: SeekId) {
        self.state().calls.push(EngineCall::Seek(target, id));
    }
}
