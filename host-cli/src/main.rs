use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::OsRng;

use keycard_core::codec;
use keycard_core::{
    CommandApdu, Instruction, MemoryFileStore, Response, StatusWord, TransportCipher, Vault,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keycard host command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a guided exchange against a fresh in-memory card.
    Demo,
    /// Feed hex-encoded commands to a fresh in-memory card.
    Session(SessionArgs),
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Script file with one command per line; stdin when omitted.
    ///
    /// Lines are hex-encoded command buffers; `select` and `deselect`
    /// are accepted as keywords, `#` starts a comment.
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,
}

type Card = Vault<MemoryFileStore, OsRng>;

fn new_card() -> Card {
    Vault::new(MemoryFileStore::new(), OsRng)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut stdout = io::stdout();
    match cli.command {
        Command::Demo => execute_demo(&mut stdout),
        Command::Session(args) => {
            let mut card = new_card();
            match args.script {
                Some(path) => {
                    let content = fs::read_to_string(&path)
                        .with_context(|| format!("failed to read script '{}'", path.display()))?;
                    run_session(content.as_bytes(), &mut stdout, &mut card)
                }
                None => run_session(io::stdin().lock(), &mut stdout, &mut card),
            }
        }
    }
}

fn run_session<I, W>(input: I, out: &mut W, card: &mut Card) -> Result<()>
where
    I: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line.context("failed to read session input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line {
            "select" => {
                let response = card.select();
                print_response(out, &response)?;
            }
            "deselect" => {
                card.deselect();
                writeln!(out, "< deselected")?;
            }
            hex_line => match hex::decode(hex_line) {
                Ok(request) => {
                    let response = card.process(&request);
                    print_response(out, &response)?;
                }
                Err(err) => writeln!(out, "! not a hex command: {err}")?,
            },
        }
    }
    Ok(())
}

fn print_response<W: Write>(out: &mut W, response: &Response) -> Result<()> {
    let word = response.status.to_word();
    if response.data.is_empty() {
        writeln!(out, "< {word:04X} ({status})", status = response.status)?;
    } else {
        writeln!(
            out,
            "< {data} {word:04X} ({status})",
            data = hex::encode_upper(&response.data),
            status = response.status,
        )?;
    }
    Ok(())
}

fn transmit<W: Write>(
    out: &mut W,
    card: &mut Card,
    label: &str,
    ins: Instruction,
    p1: u8,
    p2: u8,
    data: &[u8],
) -> Result<Response> {
    let apdu = CommandApdu { ins, p1, p2, data };
    let bytes = apdu.to_bytes();
    writeln!(out, "> {label}: {}", hex::encode_upper(&bytes))?;
    let response = card.process(&bytes);
    print_response(out, &response)?;
    Ok(response)
}

fn execute_demo<W: Write>(out: &mut W) -> Result<()> {
    let mut card = new_card();
    let pin = b"1234";

    writeln!(out, "Activating a factory-fresh card…")?;
    print_response(out, &card.select())?;

    let response = transmit(
        out,
        &mut card,
        "provision",
        Instruction::Provision,
        0x00,
        0x01,
        pin,
    )?;
    anyhow::ensure!(
        response.status == StatusWord::Ok,
        "provisioning failed: {}",
        response.status
    );
    let puk = response.data.clone();
    writeln!(
        out,
        "Recovery PUK (store it safely): {}",
        hex::encode_upper(&puk)
    )?;

    transmit(
        out,
        &mut card,
        "verify PIN",
        Instruction::VerifyPin,
        0x01,
        0x00,
        pin,
    )?;

    transmit(
        out,
        &mut card,
        "store master secret",
        Instruction::SetMasterSecret,
        0x02,
        0x01,
        b"hunter2",
    )?;
    let response = transmit(
        out,
        &mut card,
        "read master secret",
        Instruction::GetMasterSecret,
        0x02,
        0x02,
        &[],
    )?;
    writeln!(
        out,
        "Recovered master secret: {}",
        String::from_utf8_lossy(&response.data)
    )?;

    // The encrypted form answers a sealed 48-byte envelope that only the
    // PIN-derived key opens.
    let response = transmit(
        out,
        &mut card,
        "read master secret (encrypted)",
        Instruction::GetMasterSecret,
        0x01,
        0x02,
        &[],
    )?;
    let cipher = TransportCipher::from_pin(pin);
    let opened = cipher
        .decrypt(&response.data)
        .map_err(|err| anyhow::anyhow!("envelope decryption failed: {err}"))?;
    let secret = codec::open_envelope(&opened)
        .map_err(|err| anyhow::anyhow!("envelope decoding failed: {err}"))?;
    writeln!(
        out,
        "Envelope opened client-side: {}",
        String::from_utf8_lossy(secret)
    )?;

    let mut create = vec![0x00, 0x40, 0x00, 0x20];
    create.extend_from_slice(b"demo.kdbx");
    transmit(
        out,
        &mut card,
        "create data files",
        Instruction::CreateDataFiles,
        0x03,
        0x01,
        &create,
    )?;
    transmit(
        out,
        &mut card,
        "write data",
        Instruction::WriteData,
        0x03,
        0x01,
        &[0x00, 0x00, 0xCA, 0xFE],
    )?;
    transmit(
        out,
        &mut card,
        "read data",
        Instruction::ReadData,
        0x03,
        0x01,
        &[0x00, 0x00, 0x00, 0x02],
    )?;
    transmit(
        out,
        &mut card,
        "file sizes",
        Instruction::GetFileSizes,
        0x03,
        0x04,
        &[],
    )?;
    transmit(
        out,
        &mut card,
        "file name",
        Instruction::GetFileName,
        0x01,
        0x01,
        &[],
    )?;

    transmit(
        out,
        &mut card,
        "delete master secret",
        Instruction::DeleteMasterSecret,
        0x02,
        0x03,
        &[],
    )?;
    let response = transmit(
        out,
        &mut card,
        "verify PIN",
        Instruction::VerifyPin,
        0x01,
        0x00,
        pin,
    )?;
    writeln!(
        out,
        "Master secret presence flag after deletion: 0x{:02X}",
        response.data.first().copied().unwrap_or_default()
    )?;

    writeln!(out, "Demo complete.")?;
    Ok(())
}
