//! Interactive peer-to-peer encrypted messenger.
//!
//! All protocol and cryptographic logic lives in the library; this binary is
//! the operator's menu around [`Session`].

use std::io::{self, BufRead, Write};
use std::str::FromStr;

use peercrypt::error::CryptoError;
use peercrypt::session::{Inbound, ModeKind, Session, Status};
use peercrypt::{aes, SECURITY_DISCLAIMER};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    println!("{SECURITY_DISCLAIMER}\n");

    if let Err(e) = self_test() {
        eprintln!("cipher self-test failed: {e}");
        std::process::exit(1);
    }

    let mut session = Session::new();
    loop {
        let status = session.status();
        println!("\nStatus: {}", status_name(status));
        if status == Status::Connected {
            println!("Shared Key (Mod 100): {}", session.key_fingerprint());
        }

        let choices: &[&str] = match status {
            Status::Idle => &["Request New Connection", "Listen for New Connection", "Quit"],
            Status::Connected => &[
                "Listen for Request",
                "Send an Encrypted Message",
                "Re-Exchange Keys",
                "Terminate Connection",
                "Quit",
            ],
        };

        println!("What would you like to do?");
        for (i, choice) in choices.iter().enumerate() {
            println!("{i}: {choice}");
        }

        let Some(selection) = input_parse::<usize>("") else {
            println!("Invalid selection");
            continue;
        };
        let Some(&command) = choices.get(selection) else {
            println!("Invalid selection");
            continue;
        };

        match command {
            "Request New Connection" => dial(&mut session),
            "Listen for New Connection" => listen(&mut session),
            "Listen for Request" => await_request(&mut session),
            "Send an Encrypted Message" => send_message(&mut session),
            "Re-Exchange Keys" => match session.reexchange() {
                Ok(()) => println!("Complete! Ensure that the Shared Key matches!"),
                Err(e) => println!("{e}"),
            },
            "Terminate Connection" => session.terminate(),
            _ => break,
        }
    }
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Idle => "IDLE",
        Status::Connected => "CONNECTED",
    }
}

fn dial(session: &mut Session) {
    let port = match input_parse::<u16>("Enter a port") {
        Some(p) if p != 0 => p,
        _ => {
            println!("Invalid port");
            return;
        }
    };
    let mut addr = input("Enter server address (Or \"local\" for localhost)");
    if addr == "local" {
        addr = "127.0.0.1".into();
    }

    match session.dial(&addr, port) {
        Ok(()) => println!("Complete! Ensure that the Shared Key matches!"),
        Err(e) => println!("Failed to connect: {e}"),
    }
}

fn listen(session: &mut Session) {
    // The listening socket persists across connections; only ask for a port
    // the first time.
    let port = if session.local_addr().is_none() {
        match input_parse::<u16>("Enter a port") {
            Some(p) if p != 0 => p,
            _ => {
                println!("Invalid port");
                return;
            }
        }
    } else {
        0
    };

    println!("Listening...");
    match session.listen(port) {
        Ok(()) => println!("Complete! Ensure that the Shared Key matches!"),
        Err(e) => println!("Failed to connect: {e}"),
    }
}

fn await_request(session: &mut Session) {
    println!("Waiting for Request...");
    match session.await_request() {
        Ok(Inbound::Message) => {
            if acknowledge("Peer is sending a message") {
                match session.accept_message() {
                    Ok(plain) => println!("Message: {}", render(&plain)),
                    Err(e) => println!("{e}"),
                }
            } else {
                let _ = session.refuse();
            }
        }
        Ok(Inbound::Reexchange) => {
            if acknowledge("Peer is requesting to re-exchange keys") {
                match session.accept_reexchange() {
                    Ok(()) => println!("Complete! Ensure that the Shared Key matches!"),
                    Err(e) => println!("{e}"),
                }
            } else {
                let _ = session.refuse();
            }
        }
        Err(e) => println!("{e}"),
    }
}

fn send_message(session: &mut Session) {
    let message = input("Enter the message:");

    let rounds = match input_parse::<u32>("What size key?\n1. 128\n2. 192\n3. 256") {
        Some(1) => 10,
        Some(2) => 12,
        Some(3) => 14,
        _ => {
            println!("Invalid selection");
            return;
        }
    };

    let kind = match input_parse::<u32>("What mode?\n1. ECB\n2. CTR\n3. GCM") {
        Some(1) => ModeKind::Ecb,
        Some(2) => ModeKind::Ctr,
        Some(3) => ModeKind::Gcm,
        _ => {
            println!("Invalid selection");
            return;
        }
    };

    println!("Reaching out to the Peer...");
    match session.send_message(message.as_bytes(), rounds, kind) {
        Ok(()) => println!("Message sent!"),
        Err(e) => println!("{e}"),
    }
}

fn acknowledge(what: &str) -> bool {
    let answer = input(&format!("{what}: Acknowledge? (y/n)"));
    answer == "y" || answer == "Y"
}

/// Round-trip a few strings through every mode before letting the operator
/// near the menu; a broken cipher should fail loudly here, not corrupt
/// messages later.
fn self_test() -> Result<(), CryptoError> {
    let sk = [0u64; 4];
    let nonce = 42;

    let mut rounds = 10;
    for part in ["Welcome ", "to the ", "AES-DH application!"] {
        let pt = aes::inv_cipher(&aes::cipher(part.as_bytes(), &sk, rounds)?, &sk, rounds)?;
        print!("{}", render(&pt));
        rounds += 2;
    }
    println!("\t(ECB)");

    let mut rounds = 10;
    for part in ["If any of ", "these messages ", "look corrupted"] {
        let pt = aes::ctr(&aes::ctr(part.as_bytes(), &sk, rounds, nonce)?, &sk, rounds, nonce)?;
        print!("{}", render(&pt));
        rounds += 2;
    }
    println!("\t(CTR)");

    let mut rounds = 10;
    for part in ["Then you need ", "to reinstall ", "the app!"] {
        let pt =
            aes::gcm::dec(&aes::gcm::enc(part.as_bytes(), &sk, rounds, nonce)?, &sk, rounds, nonce)?;
        print!("{}", render(&pt));
        rounds += 2;
    }
    println!("\t(GCM)");

    Ok(())
}

/// Block modes zero-pad; drop the padding for display.
fn render(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn input(title: &str) -> String {
    if !title.is_empty() {
        println!("{title}");
    }
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim_end_matches(['\r', '\n']).to_string()
}

fn input_parse<T: FromStr>(title: &str) -> Option<T> {
    input(title).trim().parse().ok()
}
