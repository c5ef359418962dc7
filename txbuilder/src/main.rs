use clap::{Parser, Subcommand};
use serde_json::json;

use coinnet::address::AddressVersions;
use coinnet::builder::TransactionBuilder;
use coinnet::hashes::hash160;
use coinnet::script::MultiSigRedeemScript;
use coinnet::tx::Transaction;
use coinnet::Result;

#[derive(Parser, Debug)]
#[command(version, about = "Builds, inspects and signs standard transactions", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a multisignature redeem script and address
    Createmultisig {
        /// Number of required signatures
        min_sigs: usize,
        /// Public keys in hex
        #[arg(required = true)]
        pub_keys: Vec<String>,
    },
    /// Parses a multisignature redeem script
    Parsemultisigredeemscript {
        /// Redeem script in hex
        redeem_script: String,
    },
    /// Creates a standard transaction output
    Standardtxout {
        /// Destination address
        address: String,
        /// Value in satoshis
        value: u64,
        /// Print the serialized output as hex instead of JSON
        #[arg(short = 'x', long)]
        hex: bool,
    },
    /// Adds an output paying an address
    Addoutput {
        /// Destination address
        address: String,
        /// Value in satoshis
        value: u64,
        /// Serialized builder state in hex; empty starts a new transaction
        #[arg(default_value = "")]
        tx: String,
    },
    /// Registers a dependency and adds an input spending one of its outputs
    Addp2addressinput {
        /// The serialized dependency transaction in hex
        dependency: String,
        /// Output index within the dependency
        out_index: u32,
        /// Spending public key in hex (redeem script for script-hash outputs)
        pub_key: String,
        /// Serialized builder state in hex; empty starts a new transaction
        #[arg(default_value = "")]
        tx: String,
    },
    /// Signs a pay-to-address input
    Signtransaction {
        /// Input index
        index: usize,
        /// Public key in hex
        pub_key: String,
        /// Private key in wallet import format
        priv_key: String,
        /// Serialized builder state in hex
        tx: String,
    },
    /// Signs one slot of a multisignature input
    Signmofn {
        /// Input index
        index: usize,
        /// Public key in hex
        pub_key: String,
        /// Private key in wallet import format
        priv_key: String,
        /// Serialized builder state in hex
        tx: String,
    },
    /// Reports the signatures each input still needs
    Getmissingsigs {
        /// Serialized builder state in hex
        tx: String,
    },
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| coinnet::Error::Malformed(format!("invalid hex for {field}: {e}")))
}

fn builder_from(tx: &str) -> Result<TransactionBuilder> {
    if tx.is_empty() {
        Ok(TransactionBuilder::new())
    } else {
        TransactionBuilder::from_serialized(&decode_hex("tx", tx)?)
    }
}

fn multisig_json(multisig: &MultiSigRedeemScript, show_pub_keys: bool) -> Result<String> {
    let versions = AddressVersions::default();
    let mut value = json!({
        "m": multisig.min_sigs(),
        "n": multisig.pub_keys().len(),
        "address": multisig.address(&versions)?,
        "redeemScript": hex::encode(multisig.to_script()?),
    });
    if show_pub_keys {
        let keys: Vec<serde_json::Value> = multisig
            .pub_keys()
            .iter()
            .map(|pub_key| {
                json!({
                    "address": coinnet::address::to_base58_check(&hash160(pub_key), versions.address),
                    "pubKey": hex::encode(pub_key),
                })
            })
            .collect();
        value["pubKeys"] = json!(keys);
    }
    Ok(serde_json::to_string_pretty(&value).unwrap())
}

fn sign(index: usize, pub_key: &str, priv_key: &str, tx: &str) -> Result<String> {
    let mut builder = builder_from(tx)?;
    builder.sign(index, &decode_hex("pub_key", pub_key)?, priv_key)?;
    Ok(hex::encode(builder.serialized()))
}

fn run(command: Command) -> Result<String> {
    let versions = AddressVersions::default();
    match command {
        Command::Createmultisig { min_sigs, pub_keys } => {
            let mut multisig = MultiSigRedeemScript::new(min_sigs)?;
            for pub_key in &pub_keys {
                multisig.add_pub_key(decode_hex("pub_key", pub_key)?)?;
            }
            multisig_json(&multisig, false)
        }
        Command::Parsemultisigredeemscript { redeem_script } => {
            let multisig =
                MultiSigRedeemScript::parse(&decode_hex("redeem_script", &redeem_script)?)?;
            multisig_json(&multisig, true)
        }
        Command::Standardtxout { address, value, hex: as_hex } => {
            let mut builder = TransactionBuilder::new();
            builder.add_output(&address, value, &versions)?;
            let out = &builder.outputs()[0];
            if as_hex {
                let mut composer = coinnet::buffer::ByteBufferComposer::new();
                out.encode(&mut composer);
                Ok(hex::encode(composer.result()))
            } else {
                Ok(serde_json::to_string_pretty(&json!({
                    "amount_int": out.value,
                    "script": hex::encode(&out.script_pub_key),
                    "address": out.address(&versions),
                }))
                .unwrap())
            }
        }
        Command::Addoutput { address, value, tx } => {
            let mut builder = builder_from(&tx)?;
            builder.add_output(&address, value, &versions)?;
            Ok(hex::encode(builder.serialized()))
        }
        Command::Addp2addressinput { dependency, out_index, pub_key, tx } => {
            let mut builder = builder_from(&tx)?;
            let dependency = Transaction::from_bytes(&decode_hex("dependency", &dependency)?)?;
            let dependency_hash = dependency.hash();
            builder.add_dependency(dependency);
            builder.add_input(
                dependency_hash,
                out_index,
                &decode_hex("pub_key", &pub_key)?,
                0xffffffff,
            )?;
            Ok(hex::encode(builder.serialized()))
        }
        Command::Signtransaction { index, pub_key, priv_key, tx }
        | Command::Signmofn { index, pub_key, priv_key, tx } => {
            sign(index, &pub_key, &priv_key, &tx)
        }
        Command::Getmissingsigs { tx } => {
            let mut builder = builder_from(&tx)?;
            let report: Vec<serde_json::Value> = builder
                .missing_sigs()
                .iter()
                .map(|request| {
                    let mut entry = json!({
                        "index": request.input_index,
                        "minSigsStillNeeded": request.min_sigs_still_needed,
                        "pubKeys": request.pub_keys.iter().map(hex::encode).collect::<Vec<_>>(),
                    });
                    if let Some(value) = request.value {
                        entry["value"] = json!(value);
                    }
                    entry
                })
                .collect();
            Ok(serde_json::to_string_pretty(&json!(report)).unwrap())
        }
    }
}

fn main() {
    let args = Args::parse();
    match run(args.command) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            println!("Error: {err}");
            std::process::exit(1);
        }
    }
}
