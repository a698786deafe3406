use crate::utils::PrunerError;
use parking_lot::Mutex;

/// First-error holder shared by the workers of one phase.
///
/// "First" means lowest submission index, not earliest completion, so the
/// reported error does not depend on worker scheduling.
#[derive(Debug, Default)]
pub struct FirstError {
    slot: Mutex<Option<(usize, PrunerError)>>,
}

impl FirstError {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Record `err` for the job submitted at `index` unless an earlier job already failed.
    pub fn record(&self, index: usize, err: PrunerError) {
        let mut slot = self.slot.lock();
        match &*slot {
            Some((held, _)) if *held <= index => {}
            _ => *slot = Some((index, err)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn take(&self) -> Option<PrunerError> {
        self.slot.lock().take().map(|(_, e)| e)
    }
}
