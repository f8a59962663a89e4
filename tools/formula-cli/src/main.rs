use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use formula_engine::{
    analyze_formula,
    signing::{address_of, sign_endpoint, signing_digest, signing_key_from_hex, validate_signatures},
    AnalyzerConfig, Formula, FormulaData, OfflineContractFactory,
};
use formula_types::{ContractFactory, EndpointIndex, PresignState};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::rpc::RpcContractFactory;

mod rpc;
mod tests;

/// Compile, sign and analyze Crypto Formulas.
///
/// Chain access is optional: without an RPC URL, `analyze` runs the static checks only and
/// `verify` treats every presign as `default`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a JSON formula description into its `0x` wire form.
    Compile {
        /// Path to the JSON description (eg, formula.json).
        #[arg(long)]
        input: PathBuf,
    },

    /// Print the JSON description of a compiled formula.
    Decompile {
        #[arg(long)]
        formula: String,
    },

    /// Print the message hash and the digest each signed endpoint has to sign.
    Hash {
        #[arg(long)]
        formula: String,
    },

    /// Sign one endpoint position and print the re-compiled formula.
    Sign {
        #[arg(long)]
        formula: String,

        /// Endpoint index to sign for.
        #[arg(long)]
        endpoint: EndpointIndex,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Check every signed endpoint against its signature or presign.
    Verify {
        #[arg(long)]
        formula: String,

        /// Read presigns from this settlement contract (requires --rpc-url).
        #[arg(long, env = "SETTLEMENT_ADDRESS")]
        settlement: Option<String>,

        #[arg(long, env = "RPC_URL")]
        rpc_url: Option<String>,
    },

    /// Report everything that would likely stop the formula from executing.
    Analyze {
        #[arg(long)]
        formula: String,

        /// Settlement contract address.
        #[arg(long, env = "SETTLEMENT_ADDRESS")]
        settlement: String,

        /// Without it only static checks run.
        #[arg(long, env = "RPC_URL")]
        rpc_url: Option<String>,

        /// Stop at the execution record when the formula already ran.
        #[arg(long)]
        stop_on_already_executed: bool,

        /// Write the JSON report here instead of stdout (eg, analysis.json).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Path to a file containing the endpoint private key.
    #[arg(long, env = "PRIV_KEY_PATH", conflicts_with = "private_key")]
    private_key_path: Option<PathBuf>,

    /// Private key (hex string, 0x...).
    #[arg(long, env = "PKEY", conflicts_with = "private_key_path")]
    private_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compile { input } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("failed reading {}", input.display()))?;
            let data: FormulaData = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing JSON in {}", input.display()))?;
            let formula = data.into_formula().context("invalid formula description")?;
            println!("{}", formula.compile_hex()?);
        }
        Command::Decompile { formula } => {
            let formula = parse_formula(&formula)?;
            println!("{}", serde_json::to_string_pretty(&formula)?);
        }
        Command::Hash { formula } => {
            let formula = parse_formula(&formula)?;
            println!("{}", serde_json::to_string_pretty(&hash_report(&formula))?);
        }
        Command::Sign { formula, endpoint, key } => {
            let formula = parse_formula(&formula)?;
            let signed = sign(&formula, endpoint, &key)?;
            println!("{}", signed.compile_hex()?);
        }
        Command::Verify { formula, settlement, rpc_url } => {
            let formula = parse_formula(&formula)?;
            let presigns = match (rpc_url, settlement) {
                (Some(url), Some(settlement)) => {
                    let factory = RpcContractFactory::connect(&url)
                        .with_context(|| format!("invalid rpc url {url}"))?;
                    read_presigns(&factory, parse_address(&settlement)?, &formula).await
                }
                (Some(_), None) => {
                    return Err(anyhow!(
                        "missing settlement address: provide --settlement (or set SETTLEMENT_ADDRESS)"
                    ))
                }
                (None, _) => Vec::new(),
            };
            let validation = validate_signatures(&formula, &presigns);
            println!("{}", serde_json::to_string_pretty(&validation)?);
        }
        Command::Analyze { formula, settlement, rpc_url, stop_on_already_executed, output } => {
            let formula = parse_formula(&formula)?;
            let settlement = parse_address(&settlement)?;
            let config = AnalyzerConfig::default().stop_on_already_executed(stop_on_already_executed);

            let factory: Box<dyn ContractFactory> = match &rpc_url {
                Some(url) => Box::new(
                    RpcContractFactory::connect(url)
                        .with_context(|| format!("invalid rpc url {url}"))?,
                ),
                None => Box::new(OfflineContractFactory),
            };
            let analysis = analyze_formula(&formula, settlement, &*factory, &config).await;
            info!(
                complete = analysis.is_complete,
                errors = analysis.totals.errors,
                warnings = analysis.totals.warnings,
                "analysis finished"
            );

            let report = json!({
                "generated_at": now(),
                "settlement": settlement,
                "rpc_url": rpc_url,
                "analysis": serde_json::to_value(&analysis).context("failed serialising analysis")?,
            });
            emit_report(&report, output.as_deref())?;
            if let Some(path) = output {
                info!(hash = %formula.message_hash(), path = %path.display(), "report written");
            }
        }
    }

    Ok(())
}

fn parse_formula(input: &str) -> Result<Formula> {
    Formula::decompile_hex(input.trim()).context("failed decompiling formula")
}

fn parse_address(input: &str) -> Result<Address> {
    Address::from_str(input.trim()).with_context(|| format!("invalid address {input}"))
}

fn hash_report(formula: &Formula) -> Value {
    let endpoints: Vec<Value> = formula
        .endpoints()
        .iter()
        .enumerate()
        .take(usize::from(formula.signed_endpoint_count()))
        .map(|(i, address)| {
            let index = i as EndpointIndex;
            json!({
                "index": index,
                "address": address,
                "messageToSign": formula.message_to_sign(index),
                "signingDigest": signing_digest(formula, index),
                "signed": formula.is_signed(index),
            })
        })
        .collect();

    json!({
        "messageHash": formula.message_hash(),
        "signedEndpoints": endpoints,
    })
}

fn sign(formula: &Formula, endpoint: EndpointIndex, key: &KeyArgs) -> Result<Formula> {
    let raw = if let Some(ref path) = key.private_key_path {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    } else if let Some(ref pk) = key.private_key {
        pk.clone()
    } else {
        return Err(anyhow!(
            "missing signing key: provide --private-key-path or --private-key (or set PRIV_KEY_PATH/PKEY)"
        ));
    };
    let key = signing_key_from_hex(&raw)?;

    let signer = address_of(&key);
    if formula.endpoint(endpoint) != Some(signer) {
        warn!(%signer, endpoint, "key does not control this endpoint, signature will not validate");
    }

    let signature = sign_endpoint(formula, &key, endpoint)?;
    Ok(formula.with_signature(endpoint, signature)?)
}

async fn read_presigns(
    factory: &dyn ContractFactory,
    settlement: Address,
    formula: &Formula,
) -> Vec<PresignState> {
    let hash = formula.message_hash();
    let reads = formula.endpoints().iter().map(|endpoint| async move {
        match factory.presign_state(settlement, *endpoint, hash).await {
            Ok(state) => state,
            Err(err) => {
                warn!(%endpoint, %err, "presignedFormulas failed, assuming default");
                PresignState::Default
            }
        }
    });
    futures::future::join_all(reads).await
}

fn now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Prints `report`, or stages it next to `output` and renames it into place so a reader never
/// sees a half-written analysis.
fn emit_report(report: &Value, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(report)?;
    let Some(output) = output else {
        println!("{rendered}");
        return Ok(());
    };

    if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create report directory {}", dir.display()))?;
    }
    let staged = staging_path(output);
    fs::write(&staged, rendered)
        .with_context(|| format!("cannot stage report at {}", staged.display()))?;
    fs::rename(&staged, output)
        .with_context(|| format!("cannot move report into {}", output.display()))
}

/// Hidden sibling of `output`, eg `out/.analysis.json.partial`.
fn staging_path(output: &Path) -> PathBuf {
    let name = output.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}
