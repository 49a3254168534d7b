//! mosaicctl - command-line control client for mosaicwm
//!
//! Talks to the running window manager over the `_MOSAIC_COMMAND`
//! root property: the command code is written as a CARDINAL and a
//! ClientMessage wakes the event loop.
//!
//! # Examples
//!
//! ```bash
//! # Re-read the configuration file
//! mosaicctl reload
//!
//! # Shut the window manager down
//! mosaicctl quit
//! ```

use clap::{Parser, Subcommand};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

const CMD_RELOAD: u32 = 1;
const CMD_QUIT: u32 = 2;

/// mosaicctl - control a running mosaicwm
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload the configuration file
    Reload,

    /// Quit the window manager
    Quit,
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Reload => CMD_RELOAD,
        Commands::Quit => CMD_QUIT,
    };
    if let Err(e) = send(code) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn send(code: u32) -> anyhow::Result<()> {
    let (conn, screen_num) = RustConnection::connect(None)?;
    let root = conn.setup().roots[screen_num].root;
    let command = intern(&conn, b"_MOSAIC_COMMAND")?;
    let check = intern(&conn, b"_NET_SUPPORTING_WM_CHECK")?;

    let reply = conn
        .get_property(false, root, check, AtomEnum::WINDOW, 0, 1)?
        .reply()?;
    if reply.value32().and_then(|mut v| v.next()).unwrap_or(0) == 0 {
        anyhow::bail!("no running window manager found. Is mosaicwm running?");
    }

    conn.change_property32(PropMode::REPLACE, root, command, AtomEnum::CARDINAL, &[code])?;
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window: root,
        type_: command,
        data: ClientMessageData::from([code, 0, 0, 0, 0]),
    };
    conn.send_event(false, root, EventMask::SUBSTRUCTURE_REDIRECT, event)?;
    conn.flush()?;
    Ok(())
}

fn intern(conn: &RustConnection, name: &[u8]) -> anyhow::Result<Atom> {
    Ok(conn.intern_atom(false, name)?.reply()?.atom)
}
