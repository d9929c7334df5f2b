use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use hashlet_core::crypto::{self, verify_hmac_defaults, verify_mac_defaults};
use hashlet_core::protocol::{CheckMacMode, MacMode};
use hashlet_core::{
    DeviceState, KeyContainer, KeyStore, Session, SessionConfig, Transport, personalize,
};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cryptotronix Hashlet (ATSHA204) Tool", long_about = None)]
struct Args {
    /// I2C bus device node
    #[arg(long)]
    bus: Option<String>,

    /// 7-bit I2C address (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_address)]
    address: Option<u16>,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Don't produce any output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Output to FILE instead of standard output
    #[arg(short, long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print 32 random bytes
    Random {
        /// Update the EEPROM seed
        #[arg(long)]
        update_seed: bool,
        /// Number of bytes to print
        #[arg(long, default_value_t = 32)]
        count: usize,
    },
    /// Print the 9-byte serial number
    SerialNum,
    /// Print the lifecycle state
    State,
    /// Dump the config zone
    GetConfig,
    /// Dump the OTP zone
    GetOtp,
    /// Decode the configuration of a slot
    SlotConfig {
        #[arg(short, long, value_parser = parse_slot)]
        key_slot: u8,
    },
    /// Personalize the device (irreversible)
    Personalize {
        /// Write the keys recorded in this key store instead of fresh ones
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// MAC the SHA-256 of the input under a slot key
    Mac {
        #[arg(short, long, value_parser = parse_slot, default_value_t = 0)]
        key_slot: u8,
        #[command(flatten)]
        mode: MacModeArgs,
        #[command(flatten)]
        input: InputArgs,
    },
    /// Ask the device to check a MAC
    CheckMac {
        #[arg(short, long, value_parser = parse_slot, default_value_t = 0)]
        key_slot: u8,
        /// CheckMac mode byte
        #[arg(long, value_parser = parse_byte, default_value = "0")]
        mode: u8,
        #[arg(long)]
        challenge: String,
        #[arg(long)]
        response: String,
        /// 13 bytes of other data, as printed by `mac`
        #[arg(long)]
        meta: String,
    },
    /// Verify a MAC without the device
    OfflineVerify {
        #[arg(short, long, value_parser = parse_slot, default_value_t = 0)]
        key_slot: u8,
        /// MAC mode byte
        #[arg(long, value_parser = parse_byte, default_value = "0")]
        mode: u8,
        #[arg(long)]
        challenge: String,
        #[arg(long)]
        response: String,
        /// Key in hex; looked up in the key store when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// HMAC the SHA-256 of the input under a slot key
    Hmac {
        #[arg(short, long, value_parser = parse_slot, default_value_t = 1)]
        key_slot: u8,
        #[command(flatten)]
        input: InputArgs,
    },
    /// Verify an HMAC without the device
    OfflineHmacVerify {
        #[arg(short, long, value_parser = parse_slot, default_value_t = 1)]
        key_slot: u8,
        #[arg(long)]
        challenge: String,
        #[arg(long)]
        response: String,
        /// Key in hex; looked up in the key store when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Load TempKey with the SHA-256 of the input, or 20 bytes with --random
    Nonce {
        /// Combine the first 20 input bytes with a device random number
        #[arg(long)]
        random: bool,
        #[command(flatten)]
        input: InputArgs,
    },
    /// Read a data slot in the clear
    ReadKeySlot {
        #[arg(short, long, value_parser = parse_slot)]
        key_slot: u8,
    },
    /// Write a data slot
    WriteKeySlot {
        #[arg(short, long, value_parser = parse_slot)]
        key_slot: u8,
        /// New key in hex
        #[arg(long)]
        key: String,
        /// Current key; makes this an encrypted write
        #[arg(long)]
        current_key: Option<String>,
    },
    /// SHA-256 of the input, computed on the host
    Hash {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the device revision
    DevRev,
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Read input from FILE instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn read(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match &self.file {
            Some(path) => {
                buf = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
            }
            None => {
                std::io::stdin().read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    fn challenge(&self) -> Result<[u8; 32]> {
        Ok(crypto::sha256(&self.read()?))
    }
}

#[derive(ClapArgs, Debug)]
struct MacModeArgs {
    /// Include the serial number
    #[arg(long)]
    use_serial_num: bool,
    /// Include OTP[0..8]
    #[arg(long)]
    use_otp_0_7: bool,
    /// Include OTP[8..11]
    #[arg(long)]
    use_otp_0_10: bool,
}

impl From<&MacModeArgs> for MacMode {
    fn from(args: &MacModeArgs) -> Self {
        MacMode {
            use_serial_num: args.use_serial_num,
            use_otp_0_7: args.use_otp_0_7,
            use_otp_0_10: args.use_otp_0_10,
            ..MacMode::default()
        }
    }
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let value = parse_address(s)?;
    u8::try_from(value).map_err(|e| e.to_string())
}

fn parse_slot(s: &str) -> Result<u8, String> {
    let slot: u8 = s.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    if slot > 15 {
        return Err(format!("slot {} is out of range 0-15", slot));
    }
    Ok(slot)
}

fn parse_hex(what: &str, s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim()).with_context(|| format!("{} is not valid hex", what))
}

fn parse_hex32(what: &str, s: &str) -> Result<[u8; 32]> {
    let bytes = parse_hex(what, s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("{} must be 32 bytes, got {}", what, bytes.len()))
}

/// Where command results go: stdout, a file, or nowhere with `--quiet`.
struct Output {
    sink: Option<Box<dyn Write>>,
}

impl Output {
    fn open(quiet: bool, path: Option<&Path>) -> Result<Self> {
        let sink: Option<Box<dyn Write>> = match (quiet, path) {
            (true, _) => None,
            (false, Some(path)) => {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                Some(Box::new(BufWriter::new(file)))
            }
            (false, None) => Some(Box::new(io::stdout())),
        };
        Ok(Self { sink })
    }

    fn line(&mut self, text: impl Display) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}", text)?;
        }
        Ok(())
    }

    fn hex(&mut self, bytes: &[u8]) -> Result<()> {
        self.line(hex::encode_upper(bytes))
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(bus) = &args.bus {
        config.bus = bus.clone();
    }
    if let Some(address) = args.address {
        config.address = address;
    }
    Ok(config)
}

/// Key for `slot`, from the command line or the key store.
fn resolve_key(config: &SessionConfig, slot: u8, key: Option<&str>) -> Result<[u8; 32]> {
    if let Some(key) = key {
        return parse_hex32("key", key);
    }
    let store = config.key_store()?;
    let text = store
        .parsed_key(slot)?
        .ok_or_else(|| anyhow!("no key for slot {} in {}", slot, store.path().display()))?;
    parse_hex32("stored key", &text)
}

fn verdict(out: &mut Output, ok: bool) -> Result<bool> {
    out.line(if ok { "Verified" } else { "Mismatch" })?;
    Ok(ok)
}

/// Commands that never touch the device.
fn run_offline(
    config: &SessionConfig,
    command: &Command,
    out: &mut Output,
) -> Result<Option<bool>> {
    let ok = match command {
        Command::Hash { input } => {
            out.hex(&crypto::sha256(&input.read()?))?;
            true
        }
        Command::OfflineVerify {
            key_slot,
            mode,
            challenge,
            response,
            key,
        } => {
            let challenge = parse_hex("challenge", challenge)?;
            let response = parse_hex("response", response)?;
            let key = resolve_key(config, *key_slot, key.as_deref())?;
            let ok = verify_mac_defaults(&challenge, &response, &key, *mode, *key_slot as u16)?;
            verdict(out, ok)?
        }
        Command::OfflineHmacVerify {
            key_slot,
            challenge,
            response,
            key,
        } => {
            let challenge = parse_hex("challenge", challenge)?;
            let response = parse_hex("response", response)?;
            let key = resolve_key(config, *key_slot, key.as_deref())?;
            let ok = verify_hmac_defaults(&challenge, &response, &key, *key_slot as u16)?;
            verdict(out, ok)?
        }
        _ => return Ok(None),
    };
    Ok(Some(ok))
}

fn run_device<T: Transport>(
    config: &SessionConfig,
    session: &mut Session<T>,
    command: &Command,
    out: &mut Output,
) -> Result<bool> {
    let device = session.device();
    match command {
        Command::Random { update_seed, count } => {
            out.hex(&device.random_bytes(*count, *update_seed)?)?;
        }
        Command::SerialNum => out.hex(&device.serial_num()?)?,
        Command::State => out.line(device.device_state()?)?,
        Command::GetConfig => out.hex(&device.config_zone()?)?,
        Command::GetOtp => out.hex(&device.otp_zone()?)?,
        Command::DevRev => out.hex(&device.dev_rev()?)?,
        Command::SlotConfig { key_slot } => out.line(device.slot_config(*key_slot)?)?,
        Command::Personalize { import } => {
            let mut store = config.key_store()?;
            let keys = match import {
                Some(path) => Some(KeyContainer::from_key_store(
                    &hashlet_core::FileKeyStore::new(path),
                )?),
                None => None,
            };
            let state = personalize(device, DeviceState::Personalized, keys, &mut store)?;
            out.line(state)?;
            return Ok(state == DeviceState::Personalized);
        }
        Command::Mac {
            key_slot,
            mode,
            input,
        } => {
            let challenge = input.challenge()?;
            let resp = device.mac(MacMode::from(mode), *key_slot, &challenge)?;
            out.hex(&challenge)?;
            out.hex(&resp.mac)?;
            out.hex(&resp.meta)?;
            return Ok(resp.verified);
        }
        Command::CheckMac {
            key_slot,
            mode,
            challenge,
            response,
            meta,
        } => {
            let ok = device.check_mac(
                CheckMacMode::from_byte(*mode),
                *key_slot,
                &parse_hex("challenge", challenge)?,
                &parse_hex("response", response)?,
                &parse_hex("meta", meta)?,
            )?;
            return verdict(out, ok);
        }
        Command::Hmac { key_slot, input } => {
            let challenge = input.challenge()?;
            let key = resolve_key(config, *key_slot, None).ok();
            if key.is_none() {
                debug!(slot = key_slot, "No stored key, skipping offline check");
            }
            let resp = device.hmac(*key_slot, &challenge, key.as_ref().map(|k| &k[..]))?;
            out.hex(&challenge)?;
            out.hex(&resp.mac)?;
            if key.is_some() {
                return verdict(out, resp.verified);
            }
        }
        Command::Nonce { random, input } => {
            let data = input.read()?;
            let response = if *random {
                if data.len() < 20 {
                    bail!("nonce input must hold at least 20 bytes, got {}", data.len());
                }
                device.nonce(&data[..20])?
            } else {
                device.nonce(&crypto::sha256(&data))?
            };
            out.hex(&response)?;
        }
        Command::ReadKeySlot { key_slot } => out.hex(&device.read_key_slot(*key_slot)?)?,
        Command::WriteKeySlot {
            key_slot,
            key,
            current_key,
        } => {
            let key = parse_hex32("key", key)?;
            match current_key {
                Some(current) => {
                    let current = parse_hex32("current key", current)?;
                    device.write_key_slot_encrypted(*key_slot, &key, &current)?;
                }
                None => device.write_key_slot(*key_slot, &key)?,
            }
            info!(slot = key_slot, "Key written");
        }
        Command::Hash { .. } | Command::OfflineVerify { .. } | Command::OfflineHmacVerify { .. } => {
            bail!("{:?} does not use the device", command)
        }
    }
    Ok(true)
}

fn run(args: &Args) -> Result<bool> {
    let config = load_config(args)?;

    let mut out = Output::open(args.quiet, args.output.as_deref())?;

    let ok = match run_offline(&config, &args.command, &mut out)? {
        Some(ok) => ok,
        None => {
            info!(bus = %config.bus, address = format!("0x{:02X}", config.address), "Opening Hashlet");
            let mut session = Session::open(&config)?;
            run_device(&config, &mut session, &args.command, &mut out)?
        }
    };
    out.flush()?;
    Ok(ok)
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else if args.quiet {
                    tracing::Level::ERROR.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
