//! Replay of known-good raw transactions through the legacy codec.

use alloy_primitives::{Address, B256};
use serde::Serialize;
use tracing::{info, warn};

use wallet_factory_types::RawTxFixture;

use crate::{
    errors::MalformedTxError,
    raw_tx::{decode_traced, encode, parse_hex, LegacyTransaction},
};

/// What a fixture decoded to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub tx_hash: B256,
    pub sender: Address,
    pub chain_id: Option<u64>,
    pub byte_len: usize,
    pub transaction: LegacyTransaction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureOutcome {
    pub id: String,
    pub result: Result<ReplaySummary, MalformedTxError>,
}

#[derive(Clone, Debug, Default)]
pub struct ReplayReport {
    pub outcomes: Vec<FixtureOutcome>,
}

impl ReplayReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// Decode one fixture, recover its sender and check that re-encoding reproduces the input.
pub fn replay_fixture(fixture: &RawTxFixture) -> Result<ReplaySummary, MalformedTxError> {
    let bytes = parse_hex(&fixture.content)?;
    let (transaction, trace) = decode_traced(&bytes)?;
    if fixture.verbose {
        for field in &trace {
            info!(
                fixture = %fixture.id,
                field = field.field,
                offset = field.offset,
                header_len = field.header_len,
                payload_len = field.payload_len,
                "decoded field"
            );
        }
    }
    if encode(&transaction) != bytes {
        return Err(MalformedTxError::RoundTripMismatch);
    }
    let sender = transaction.recover_sender()?;
    Ok(ReplaySummary {
        tx_hash: transaction.tx_hash(),
        sender,
        chain_id: transaction.chain_id(),
        byte_len: bytes.len(),
        transaction,
    })
}

/// Replay every fixture; one bad fixture never stops the rest.
pub fn replay_fixtures(fixtures: &[RawTxFixture]) -> ReplayReport {
    let outcomes = fixtures
        .iter()
        .map(|fixture| {
            let result = replay_fixture(fixture);
            match &result {
                Ok(summary) => info!(
                    fixture = %fixture.id,
                    tx_hash = %summary.tx_hash,
                    sender = %summary.sender,
                    bytes = summary.byte_len,
                    "fixture replayed"
                ),
                Err(err) => warn!(fixture = %fixture.id, error = %err, "fixture failed to replay"),
            }
            FixtureOutcome {
                id: fixture.id.clone(),
                result,
            }
        })
        .collect();
    ReplayReport { outcomes }
}

/// Fixtures stored as a JSON array of `{ id, content, verbose? }`.
pub fn fixtures_from_json(json: &str) -> Result<Vec<RawTxFixture>, serde_json::Error> {
    serde_json::from_str(json)
}
