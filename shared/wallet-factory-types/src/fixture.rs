use serde::{Deserialize, Serialize};

/// A known-good signed legacy transaction used for codec regression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxFixture {
    pub id: String,
    /// Hex blob, usually `0x`-prefixed.
    pub content: String,
    /// Emit a per-field decode trace while replaying this fixture.
    #[serde(default)]
    pub verbose: bool,
}

impl RawTxFixture {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
