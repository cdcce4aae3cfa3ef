/// What one epoch's validation loss meant for the minimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New best loss; the caller should snapshot the current weights.
    Improved,
    /// No improvement, but patience is not exhausted yet.
    Stalled,
    /// Patience exhausted; the caller should restore the best snapshot.
    Stop,
}

/// Minimization-with-patience control: tracks the best validation loss and
/// counts consecutive non-improving epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best_loss: f32,
    counter: usize,
    stopped: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best_loss: f32::INFINITY,
            counter: 0,
            stopped: false,
        }
    }

    pub fn observe(&mut self, val_loss: f32) -> Verdict {
        if self.stopped {
            return Verdict::Stop;
        }

        if val_loss < self.best_loss - self.min_delta {
            self.best_loss = val_loss;
            self.counter = 0;
            Verdict::Improved
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                self.stopped = true;
                Verdict::Stop
            } else {
                Verdict::Stalled
            }
        }
    }

    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }

    pub fn stalled_epochs(&self) -> usize {
        self.counter
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }
}
