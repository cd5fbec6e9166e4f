// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate amplify;

use bitcoin::hashes::hex::{self, FromHex, ToHex};
use bitcoin_scripts::{Leaf, LockScript, ScriptError, TaprootError};
use clap::{ArgAction, Parser};
use colored::Colorize;
use descriptors::{generate_threshold_csa, CompositionError, TapLeaf, TapTree};
use secp256k1::XOnlyPublicKey;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser)]
#[derive(Clone, Debug)]
#[clap(
    author,
    version,
    name = "btc-tap",
    about = "Command-line tool for taproot trees, tapscript leaves and scripts"
)]
pub struct Args {
    /// Command to execute
    #[clap(subcommand)]
    pub command: Command,

    /// Increase verbosity of the logging; `RUST_LOG` takes precedence.
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Tool command to execute
#[derive(Subcommand)]
#[derive(Clone, Debug)]
pub enum Command {
    /// Compile tapscript leaf descriptor `ts(...)`
    Leaf {
        /// Leaf descriptor
        descriptor: TapLeaf,
    },

    /// Construct taproot output from the tree descriptor `tp(...)`
    Tree {
        /// Taproot tree descriptor
        descriptor: TapTree,
    },

    /// Generate `OP_CHECKSIGADD` leaves for all k-of-n subsets of the keys
    Csa {
        /// Number of required signatures
        threshold: usize,

        /// X-only public keys
        #[clap(required = true)]
        keys: Vec<XOnlyPublicKey>,
    },

    /// Disassemble script
    Decode {
        /// Hex-encoded script
        script: String,
    },
}

impl Args {
    fn init_logging(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    pub fn exec(self) -> Result<(), Error> {
        debug!(command = ?self.command, "executing");
        match self.command {
            Command::Leaf { descriptor } => leaf(&descriptor),
            Command::Tree { descriptor } => tree(&descriptor),
            Command::Csa { threshold, keys } => csa(threshold, &keys),
            Command::Decode { script } => decode(&script),
        }
    }
}

fn leaf(leaf: &TapLeaf) -> Result<(), Error> {
    println!("{} {leaf}", "Leaf".bright_white());
    println!("  script {}", leaf.script().as_bytes().to_hex());
    println!("    {}", leaf.script());
    println!("  leaf version {:#04x}", leaf.leaf_version());
    println!("  leaf hash {}", leaf.leaf_hash());
    if let Some(fragment) = leaf.miniscript() {
        println!("  miniscript {}", fragment.to_string().bright_green());
        println!(
            "    type {}, correctness {}, malleability {}",
            fragment.base_type(),
            fragment.correctness(),
            fragment.malleability()
        );
        println!("  satisfaction:");
        for item in fragment.sat() {
            println!("    - {item}");
        }
        match fragment.nsat() {
            None => println!("  not dissatisfiable"),
            Some(nsat) => {
                println!("  dissatisfaction:");
                for item in nsat {
                    println!("    - <{}>", item.to_hex());
                }
            }
        }
    }
    Ok(())
}

fn tree(tree: &TapTree) -> Result<(), Error> {
    let output = tree.construct()?;
    println!("{} {tree}", "Tree".bright_white());
    println!("  internal key {}", output.internal_key);
    println!("  output key {} ({:?} y)", output.output_key.to_string().bright_green(), output.parity);
    println!("  tweak {}", output.tweak.to_hex());
    match output.merkle_root {
        Some(root) => println!("  merkle root {root}"),
        None => println!("  key path only"),
    }
    println!("  script pubkey {}", output.script_pubkey().as_bytes().to_hex());
    for (no, entry) in output.controls.iter().enumerate() {
        println!("{} leaf {}", no + 1, entry.leaf.leaf_script());
        println!("  depth {}", entry.control_block.depth());
        println!("  control block {}", entry.control_block);
    }
    Ok(())
}

fn csa(threshold: usize, keys: &[XOnlyPublicKey]) -> Result<(), Error> {
    let leaves = generate_threshold_csa(threshold, keys)?;
    eprintln!(
        "Generated {} {}-of-{} leaves",
        leaves.len().to_string().yellow(),
        threshold,
        keys.len()
    );
    for leaf in leaves {
        println!("{leaf}");
    }
    Ok(())
}

fn decode(script: &str) -> Result<(), Error> {
    let script = LockScript::from(Vec::<u8>::from_hex(script)?);
    println!("{script}");
    println!("  length {} bytes", script.len());
    println!("  {} tokens", script.tokens()?.len());
    println!(
        "  sigops {} (accurate {})",
        script.sigop_count(false)?,
        script.sigop_count(true)?
    );
    if script.is_p2tr() {
        println!("  {}", "pay-to-taproot".bright_green());
    } else if script.is_p2sh() {
        println!("  {}", "pay-to-script-hash".bright_green());
    } else if script.is_p2pk() {
        println!("  {}", "pay-to-pubkey".bright_green());
    } else if script.is_checksigadd() {
        println!("  {}", "OP_CHECKSIGADD threshold".bright_green());
    }
    Ok(())
}

#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum Error {
    #[from]
    Hex(hex::Error),

    #[from]
    Script(ScriptError),

    #[from]
    Composition(CompositionError),

    #[from]
    Taproot(TaprootError),
}

fn main() {
    let args = Args::parse();
    args.init_logging();
    if let Err(err) = args.exec() {
        eprintln!("{}: {}\n", "Error".bright_red(), err);
        std::process::exit(1);
    }
}
