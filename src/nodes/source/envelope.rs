//! Linear ADSR envelope.

/// ADSR envelope states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeState {
    /// Output is zero.
    #[default]
    Idle,
    /// Ramping up toward 1.
    Attack,
    /// Falling from 1 toward the sustain level.
    Decay,
    /// Holding at the sustain level while the note is held.
    Sustain,
    /// Falling to zero after note off.
    Release,
}

/// Stage times in seconds plus the sustain level, sampled once per quantum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
        }
    }
}

/// The envelope state machine.
///
/// Retriggering from any state other than Attack restarts the attack from
/// the current level, so there is never a jump back to zero.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    state: EnvelopeState,
    level: f32,
    release_start: f32,
    samples_in_state: u64,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == EnvelopeState::Idle
    }

    /// Samples spent in the current state.
    #[inline]
    pub fn samples_in_state(&self) -> u64 {
        self.samples_in_state
    }

    pub fn note_on(&mut self) {
        if self.state != EnvelopeState::Attack {
            self.enter(EnvelopeState::Attack);
        }
    }

    pub fn note_off(&mut self) {
        match self.state {
            EnvelopeState::Attack | EnvelopeState::Decay | EnvelopeState::Sustain => {
                self.release_start = self.level;
                self.enter(EnvelopeState::Release);
            }
            EnvelopeState::Idle | EnvelopeState::Release => (),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn advance(&mut self, adsr: &Adsr, sample_rate: f32) -> f32 {
        let sustain = adsr.sustain.clamp(0.0, 1.0);
        self.samples_in_state += 1;

        match self.state {
            EnvelopeState::Idle => self.level = 0.0,
            EnvelopeState::Attack => {
                self.level += step(1.0, adsr.attack, sample_rate);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.enter(EnvelopeState::Decay);
                }
            }
            EnvelopeState::Decay => {
                let delta = step(1.0 - sustain, adsr.decay, sample_rate);
                self.level = (self.level - delta).max(sustain).min(self.level);
                if self.level <= sustain {
                    self.enter(EnvelopeState::Sustain);
                }
            }
            EnvelopeState::Sustain => self.level = sustain,
            EnvelopeState::Release => {
                self.level -= step(self.release_start, adsr.release, sample_rate);
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.enter(EnvelopeState::Idle);
                }
            }
        }
        self.level
    }

    fn enter(&mut self, state: EnvelopeState) {
        self.state = state;
        self.samples_in_state = 0;
    }
}

/// Per-sample increment covering `distance` in `seconds`; zero-length stages jump.
#[inline]
fn step(distance: f32, seconds: f32, sample_rate: f32) -> f32 {
    let samples = seconds * sample_rate;
    if samples <= 1.0 || !samples.is_finite() {
        distance.max(f32::EPSILON)
    } else {
        distance.max(f32::EPSILON) / samples
    }
}
