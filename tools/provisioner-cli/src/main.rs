use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

use wallet_factory_types::{
    policy::{parse_identity, parse_uint, NumberInput},
    AuthorizationSignature, PolicyConfig, RawTxFixture, WalletCreationRequest, WalletPolicy,
};
use wallet_provisioner::{
    digest::build_digest,
    encoder::encode_policy,
    errors::MismatchOrigin,
    factory::create_wallet_calldata,
    raw_tx,
    replay::{fixtures_from_json, replay_fixtures},
    signer::verify_authorization,
    AddressMismatchError, AuthorizationSigner, LocalKeySigner, ProvisioningConfig,
};

/// Exit code for a wallet address that disagrees with the local derivation.
const EXIT_ADDRESS_MISMATCH: u8 = 3;

/// Off-chain provisioning of deterministic smart wallets: address prediction, owner
/// authorization and raw transaction fixtures.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    factory: FactoryArgs,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which factory deployment to work against. `--config` wins over the individual flags.
#[derive(Args, Debug)]
struct FactoryArgs {
    /// Provisioning config JSON (factory, chainId, walletInitCodeHash, ...).
    #[arg(long, global = true, env = "PROVISIONING_CONFIG")]
    config: Option<PathBuf>,

    /// Wallet factory address.
    #[arg(long, global = true, env = "FACTORY_ADDRESS")]
    factory: Option<String>,

    #[arg(long, global = true, env = "CHAIN_ID")]
    chain_id: Option<u64>,

    /// keccak256 of the wallet creation code deployed by the factory.
    #[arg(long, global = true, env = "WALLET_INIT_CODE_HASH")]
    init_code_hash: Option<String>,
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Path to a file containing the owner private key.
    #[arg(long, env = "PRIV_KEY_PATH", conflicts_with = "private_key")]
    private_key_path: Option<PathBuf>,

    /// Owner private key (hex string, 0x...). Wiped from memory on drop.
    #[arg(long, env = "PKEY", conflicts_with = "private_key_path", hide_env_values = true)]
    private_key: Option<Zeroizing<String>>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the counterfactual wallet address of (owner, salt).
    Predict {
        #[arg(long)]
        owner: String,
        /// Decimal or 0x-hex.
        #[arg(long, default_value = "0")]
        salt: String,
        /// Address reported elsewhere (eg. the factory's computeWalletAddress); exit 3 on mismatch.
        #[arg(long)]
        expect: Option<String>,
    },
    /// Encode, digest and sign a policy, then write a provisioning record.
    Sign {
        /// Policy JSON (owner, guardians, quota, inheritor, feeRecipient, feeToken, feeAmount, salt).
        #[arg(long)]
        policy: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
        /// Where to write the record; printed to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Address reported elsewhere for this wallet; exit 3 on mismatch.
        #[arg(long)]
        expect: Option<String>,
    },
    /// Check that a signature authorizes a policy for this factory.
    Verify {
        #[arg(long)]
        policy: PathBuf,
        /// 65-byte r || s || v signature, hex.
        #[arg(long)]
        signature: String,
    },
    /// Decode a raw signed legacy transaction.
    DecodeTx {
        /// Hex blob, 0x optional.
        raw: String,
    },
    /// Decode, re-encode and compare every fixture of a fixture set.
    Replay {
        /// JSON array of { id, content, verbose } or a TypeScript fixture module.
        #[arg(long)]
        fixtures: PathBuf,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.chain().any(|cause| cause.is::<AddressMismatchError>()) {
                ExitCode::from(EXIT_ADDRESS_MISMATCH)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Predict { owner, salt, expect } => {
            let config = load_config(&cli.factory)?;
            let owner = parse_identity("owner", owner)?;
            let salt = parse_uint("salt", &NumberInput::Text(salt.clone()))?;
            let predicted = config.predict_wallet_address(owner, salt);
            check_expected(predicted, expect.as_deref())?;
            println!("{predicted}");
        }
        Commands::Sign {
            policy,
            key,
            out,
            expect,
        } => {
            let config = load_config(&cli.factory)?;
            let policy = load_policy(policy)?;
            let signer = load_signer(key)?;
            let record = sign_policy(&config, &policy, &signer)?;
            check_expected(config.predict_wallet_address(policy.owner, policy.salt), expect.as_deref())?;
            match out {
                Some(path) => {
                    write_json_atomic(path, &record)?;
                    println!("Wrote provisioning record for {} to {}", policy.owner, path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&record)?),
            }
        }
        Commands::Verify { policy, signature } => {
            let config = load_config(&cli.factory)?;
            let policy = load_policy(policy)?;
            let signature = AuthorizationSignature::new(
                raw_tx::parse_hex(signature).context("signature is not valid hex")?,
            );
            let signer = verify_authorization(&config.domain(), &policy, &signature)
                .context("authorization does not verify")?;
            println!("valid: signed by owner {signer}");
        }
        Commands::DecodeTx { raw } => {
            let tx = raw_tx::decode_hex(raw)?;
            let sender = tx.recover_sender()?;
            let output = json!({
                "txHash": tx.tx_hash(),
                "sender": sender,
                "chainId": tx.chain_id(),
                "contractCreation": tx.is_contract_creation(),
                "transaction": tx,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Replay { fixtures } => {
            let fixtures = load_fixtures(fixtures)?;
            let report = replay_fixtures(&fixtures);
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(summary) => println!(
                        "ok    {}  {}  sender {}  ({} bytes)",
                        outcome.id, summary.tx_hash, summary.sender, summary.byte_len
                    ),
                    Err(err) => println!("FAIL  {}  {err}", outcome.id),
                }
            }
            println!("{} passed, {} failed", report.passed(), report.failed());
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(args: &FactoryArgs) -> Result<ProvisioningConfig> {
    if let Some(path) = &args.config {
        return Ok(ProvisioningConfig::from_json_file(path)?);
    }

    let factory = args
        .factory
        .as_deref()
        .ok_or_else(|| anyhow!("missing factory: provide --config or --factory (or set FACTORY_ADDRESS)"))?;
    let chain_id = args
        .chain_id
        .ok_or_else(|| anyhow!("missing chain id: provide --config or --chain-id (or set CHAIN_ID)"))?;
    let init_code_hash = args.init_code_hash.as_deref().ok_or_else(|| {
        anyhow!("missing init-code hash: provide --config or --init-code-hash (or set WALLET_INIT_CODE_HASH)")
    })?;

    let config = ProvisioningConfig::new(
        parse_identity("factory", factory)?,
        chain_id,
        init_code_hash
            .trim()
            .parse::<B256>()
            .with_context(|| format!("init-code hash `{init_code_hash}` is not 32 bytes of hex"))?,
    );
    config.validate()?;
    Ok(config)
}

fn load_policy(path: &Path) -> Result<WalletPolicy> {
    let json = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let config: PolicyConfig = serde_json::from_str(&json)
        .with_context(|| format!("failed parsing policy JSON in {}", path.display()))?;
    Ok(config.into_policy()?)
}

fn load_signer(key: &KeyArgs) -> Result<LocalKeySigner> {
    if let Some(path) = &key.private_key_path {
        let secret = Zeroizing::new(
            fs::read_to_string(path).with_context(|| format!("failed reading key file {}", path.display()))?,
        );
        return Ok(LocalKeySigner::from_hex(&secret)?);
    }
    match &key.private_key {
        Some(secret) => Ok(LocalKeySigner::from_hex(secret)?),
        None => Err(anyhow!(
            "missing owner key: provide --private-key-path or --private-key (or set PRIV_KEY_PATH/PKEY)"
        )),
    }
}

fn sign_policy(config: &ProvisioningConfig, policy: &WalletPolicy, signer: &LocalKeySigner) -> Result<Value> {
    if signer.address() != policy.owner {
        return Err(anyhow!(
            "key belongs to {}, but the policy owner is {}",
            signer.address(),
            policy.owner
        ));
    }

    let domain = config.domain();
    let encoded = encode_policy(policy)?;
    let digest = build_digest(&domain, &encoded)?;
    let signature = signer.sign_digest(&digest)?;
    verify_authorization(&domain, policy, &signature).context("fresh signature failed verification")?;

    let predicted = config.predict_wallet_address(policy.owner, policy.salt);
    let request = WalletCreationRequest::new(policy.clone(), signature);
    info!(owner = %policy.owner, salt = %policy.salt, %predicted, %digest, "signed wallet creation");

    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    Ok(json!({
        "factory": config.factory,
        "chainId": config.chain_id,
        "owner": policy.owner,
        "salt": policy.salt,
        "predictedAddress": predicted,
        "encodedPolicy": encoded.to_bytes(),
        "digest": digest,
        "signature": request.signature(),
        "calldata": create_wallet_calldata(&request),
        "policy": policy,
        "signedAt": now,
    }))
}

fn check_expected(predicted: Address, expect: Option<&str>) -> Result<()> {
    let Some(expect) = expect else {
        return Ok(());
    };
    let reported = parse_identity("expect", expect)?;
    if reported != predicted {
        warn!(%predicted, %reported, "expected wallet address differs from local derivation");
        return Err(AddressMismatchError {
            predicted,
            reported,
            origin: MismatchOrigin::Oracle,
        }
        .into());
    }
    Ok(())
}

fn load_fixtures(path: &Path) -> Result<Vec<RawTxFixture>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        return fixtures_from_json(&text)
            .with_context(|| format!("failed parsing fixture JSON in {}", path.display()));
    }
    let fixtures = scrape_ts_fixtures(&text)?;
    if fixtures.is_empty() {
        return Err(anyhow!("no fixtures found in {}", path.display()));
    }
    Ok(fixtures)
}

/// Pull `{ id: "...", content: "0x...", verbose: true }` entries out of a TypeScript fixture module.
fn scrape_ts_fixtures(source: &str) -> Result<Vec<RawTxFixture>> {
    let re_entry = Regex::new(r"\{[^{}]*\}")?;
    let re_id = Regex::new(r#"id\s*:\s*["']([^"']*)["']"#)?;
    let re_content = Regex::new(r#"content\s*:\s*["'](0x[0-9a-fA-F]*)["']"#)?;
    let re_verbose = Regex::new(r"verbose\s*:\s*true")?;

    let fixtures = re_entry
        .find_iter(source)
        .filter_map(|entry| {
            let entry = entry.as_str();
            let id = re_id.captures(entry)?.get(1)?.as_str();
            let content = re_content.captures(entry)?.get(1)?.as_str();
            Some(RawTxFixture::new(id, content).verbose(re_verbose.is_match(entry)))
        })
        .collect();
    Ok(fixtures)
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised =
        serde_json::to_string_pretty(value).context("failed serialising provisioning record")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
