//! Standalone AES file encryption tool.
//!
//! ```text
//! aes-tool --mode=ENC-256-GCM --infile=plain.txt --outfile=cipher.bin --keyfile=key.bin
//! ```
//!
//! Encrypted files start with the 8-byte little-endian nonce, followed by
//! the ciphertext; decryption reads the nonce back from the same position.
//! Without `--keyfile` the key is prompted for (the first line of stdin).

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::error::ErrorKind;
use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use peercrypt::aes::{self, Mode};
use peercrypt::{key_from_bytes, SECURITY_DISCLAIMER};

#[derive(Parser)]
#[command(
    name = "aes-tool",
    about = "Encrypt or decrypt a file with a from-scratch AES. A teaching tool, not secure.",
    after_help = "MODE is OP-SIZE-CHAIN with OP in {ENC, DEC}, SIZE in {128, 192, 256}, \
                  and CHAIN in {ECB, CTR, GCM}; for example ENC-256-GCM."
)]
struct Args {
    /// Operation, key size, and chaining mode, e.g. ENC-128-CTR
    #[arg(long)]
    mode: String,

    /// Input path; stdin when omitted
    #[arg(long)]
    infile: Option<PathBuf>,

    /// Output path; stdout when omitted
    #[arg(long)]
    outfile: Option<PathBuf>,

    /// Key file; prompted for when omitted
    #[arg(long)]
    keyfile: Option<PathBuf>,

    /// Chatty progress output on stderr
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Enc,
    Dec,
}

#[derive(Clone, Copy)]
enum Chain {
    Ecb,
    Ctr,
    Gcm,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            exit(0);
        }
        Err(e) => {
            let _ = e.print();
            exit(-1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(io::stderr)
        .init();

    let Some((op, size, chain)) = parse_mode(&args.mode) else {
        eprintln!("invalid --mode {:?}; expected OP-SIZE-CHAIN, e.g. ENC-128-GCM", args.mode);
        exit(-1);
    };
    let rounds = match size {
        128 => 10,
        192 => 12,
        _ => 14,
    };

    eprintln!("{SECURITY_DISCLAIMER}");

    let key_bytes = match read_key(&args.keyfile) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read key: {e}");
            exit(1);
        }
    };
    let limit = (size / 8) as usize;
    if key_bytes.len() > limit {
        eprintln!(
            "key is {} bytes but AES-{size} takes at most {limit}; refusing to truncate",
            key_bytes.len()
        );
        exit(-1);
    }
    if key_bytes.len() < limit {
        warn!(
            "key is {} bytes, shorter than the {limit} AES-{size} expects; zero-padding",
            key_bytes.len()
        );
    }
    let key = key_from_bytes(&key_bytes);

    let input = match read_input(&args.infile) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to read input: {e}");
            exit(1);
        }
    };
    debug!("read {} input bytes", input.len());

    let output = match op {
        Op::Enc => {
            let nonce: u64 = SmallRng::from_entropy().gen();
            debug!("encrypting with nonce {nonce}");
            match aes::encrypt(&input, &key, rounds, wire_mode(chain, nonce)) {
                Ok(cipher) => {
                    let mut out = nonce.to_le_bytes().to_vec();
                    out.extend_from_slice(&cipher);
                    out
                }
                Err(e) => {
                    eprintln!("encryption failed: {e}");
                    exit(1);
                }
            }
        }
        Op::Dec => {
            if input.len() < 8 {
                eprintln!("input is too short to carry a nonce header");
                exit(1);
            }
            let nonce = u64::from_le_bytes(input[..8].try_into().expect("checked length"));
            debug!("decrypting with nonce {nonce}");
            match aes::decrypt(&input[8..], &key, rounds, wire_mode(chain, nonce)) {
                Ok(plain) => plain,
                Err(e) => {
                    eprintln!("decryption failed: {e}");
                    exit(1);
                }
            }
        }
    };

    if let Err(e) = write_output(&args.outfile, &output) {
        eprintln!("failed to write output: {e}");
        exit(1);
    }
    debug!("wrote {} output bytes", output.len());
}

fn parse_mode(mode: &str) -> Option<(Op, u32, Chain)> {
    let mut parts = mode.split('-');
    let op = match parts.next()? {
        "ENC" => Op::Enc,
        "DEC" => Op::Dec,
        _ => return None,
    };
    let size: u32 = parts.next()?.parse().ok()?;
    if !matches!(size, 128 | 192 | 256) {
        return None;
    }
    let chain = match parts.next()? {
        "ECB" => Chain::Ecb,
        "CTR" => Chain::Ctr,
        "GCM" => Chain::Gcm,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((op, size, chain))
}

fn wire_mode(chain: Chain, nonce: u64) -> Mode {
    match chain {
        Chain::Ecb => Mode::Ecb,
        Chain::Ctr => Mode::Ctr(nonce),
        Chain::Gcm => Mode::Gcm(nonce),
    }
}

fn read_key(keyfile: &Option<PathBuf>) -> io::Result<Vec<u8>> {
    match keyfile {
        Some(path) => fs::read(path),
        None => {
            // The prompt consumes the first line of stdin; piped data can
            // lead with the key.
            eprint!("Enter the key: ");
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim_end_matches(['\r', '\n']).as_bytes().to_vec())
        }
    }
}

fn read_input(infile: &Option<PathBuf>) -> io::Result<Vec<u8>> {
    match infile {
        Some(path) => fs::read(path),
        None => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn write_output(outfile: &Option<PathBuf>, data: &[u8]) -> io::Result<()> {
    match outfile {
        Some(path) => fs::write(path, data),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()
        }
    }
}
