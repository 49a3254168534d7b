//! Integration tests for mosaicwm using Xvfb.
//!
//! These tests require:
//! - Xvfb (headless X server)
//! - Built mosaicwm and mosaicctl binaries
//!
//! If Xvfb is not available, tests are skipped. Each test uses its own
//! display number so they can run in parallel.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

fn xvfb_available() -> bool {
    Command::new("which")
        .arg("Xvfb")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

struct TestHarness {
    xvfb: Child,
    wm: Option<Child>,
    display: String,
}

impl TestHarness {
    /// Start Xvfb on the given display and wait for it to accept
    /// connections.
    fn xvfb_only(display_num: u32) -> Option<Self> {
        if !xvfb_available() {
            eprintln!("Xvfb not found, skipping test");
            return None;
        }
        let display = format!(":{}", display_num);
        let xvfb = Command::new("Xvfb")
            .args([&display, "-screen", "0", "1280x800x24"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;
        let harness = Self {
            xvfb,
            wm: None,
            display,
        };
        harness.wait_for(|| harness.connect().is_some())?;
        Some(harness)
    }

    /// Start Xvfb plus a window manager on it and wait for the check
    /// window to be advertised.
    fn with_wm(display_num: u32) -> Option<Self> {
        let mut harness = Self::xvfb_only(display_num)?;
        let wm = Command::new(env!("CARGO_BIN_EXE_mosaicwm"))
            .env("DISPLAY", &harness.display)
            .env("HOME", std::env::temp_dir())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;
        harness.wm = Some(wm);
        harness.wait_for(|| harness.wm_running())?;
        Some(harness)
    }

    fn connect(&self) -> Option<(RustConnection, usize)> {
        RustConnection::connect(Some(&self.display)).ok()
    }

    fn wait_for(&self, mut cond: impl FnMut() -> bool) -> Option<()> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return Some(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        None
    }

    fn wm_running(&self) -> bool {
        let Some((conn, screen_num)) = self.connect() else {
            return false;
        };
        let root = conn.setup().roots[screen_num].root;
        let Ok(check) = atom(&conn, b"_NET_SUPPORTING_WM_CHECK") else {
            return false;
        };
        conn.get_property(false, root, check, AtomEnum::WINDOW, 0, 1)
            .ok()
            .and_then(|c| c.reply().ok())
            .and_then(|r| r.value32().and_then(|mut v| v.next()))
            .map(|w| w != 0)
            .unwrap_or(false)
    }

    fn ctl(&self, subcommand: &str) -> std::process::ExitStatus {
        Command::new(env!("CARGO_BIN_EXE_mosaicctl"))
            .arg(subcommand)
            .env("DISPLAY", &self.display)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .expect("failed to run mosaicctl")
    }

    /// Create and map a plain client window, then wait for the window
    /// manager to list it as managed.
    fn spawn_client(&self, conn: &RustConnection, screen_num: usize) -> Window {
        let screen = &conn.setup().roots[screen_num];
        let win = conn.generate_id().unwrap();
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            win,
            screen.root,
            0,
            0,
            300,
            200,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new().background_pixel(screen.white_pixel),
        )
        .unwrap();
        conn.map_window(win).unwrap();
        conn.flush().unwrap();
        self.wait_for(|| self.client_list(conn, screen_num).contains(&win))
            .expect("window was never managed");
        win
    }

    fn client_list(&self, conn: &RustConnection, screen_num: usize) -> Vec<Window> {
        let root = conn.setup().roots[screen_num].root;
        let list = atom(conn, b"_NET_CLIENT_LIST").unwrap();
        conn.get_property(false, root, list, AtomEnum::WINDOW, 0, 64)
            .ok()
            .and_then(|c| c.reply().ok())
            .and_then(|r| r.value32().map(|v| v.collect()))
            .unwrap_or_default()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(wm) = &mut self.wm {
            let _ = wm.kill();
            let _ = wm.wait();
        }
        let _ = self.xvfb.kill();
        let _ = self.xvfb.wait();
    }
}

fn atom(conn: &RustConnection, name: &[u8]) -> Result<Atom, Box<dyn std::error::Error>> {
    Ok(conn.intern_atom(false, name)?.reply()?.atom)
}

fn geometry(conn: &RustConnection, win: Window) -> (i16, i16, u16, u16) {
    let g = conn.get_geometry(win).unwrap().reply().unwrap();
    (g.x, g.y, g.width, g.height)
}

#[test]
fn wm_advertises_itself() {
    let Some(harness) = TestHarness::with_wm(91) else {
        return;
    };
    assert!(harness.wm_running());
}

#[test]
fn new_clients_are_managed_and_tiled() {
    let Some(harness) = TestHarness::with_wm(92) else {
        return;
    };
    let (conn, screen_num) = harness.connect().unwrap();
    let first = harness.spawn_client(&conn, screen_num);
    let second = harness.spawn_client(&conn, screen_num);

    // Give the layout a moment to settle after the second map.
    harness
        .wait_for(|| {
            let (x1, _, w1, _) = geometry(&conn, first);
            let (x2, _, _, _) = geometry(&conn, second);
            // Master and stack columns side by side, neither parked
            // off screen.
            x1 >= 0 && x2 >= x1 + w1 as i16
        })
        .expect("clients were never tiled side by side");

    let (_, y1, _, h1) = geometry(&conn, first);
    let (_, y2, _, h2) = geometry(&conn, second);
    // Both columns sit below the dash strip and fill the work area.
    assert!(y1 >= 24 && y2 >= 24);
    assert!(h1 > 700 && h2 > 700);
}

#[test]
fn unmanaged_windows_leave_the_client_list() {
    let Some(harness) = TestHarness::with_wm(93) else {
        return;
    };
    let (conn, screen_num) = harness.connect().unwrap();
    let win = harness.spawn_client(&conn, screen_num);
    conn.destroy_window(win).unwrap();
    conn.flush().unwrap();
    harness
        .wait_for(|| !harness.client_list(&conn, screen_num).contains(&win))
        .expect("destroyed window stayed in the client list");
}

#[test]
fn fullscreen_toggle_restores_geometry() {
    let Some(harness) = TestHarness::with_wm(96) else {
        return;
    };
    let (conn, screen_num) = harness.connect().unwrap();
    let root = conn.setup().roots[screen_num].root;
    let win = harness.spawn_client(&conn, screen_num);
    // Let the initial tiling settle before sampling.
    harness.wait_for(|| geometry(&conn, win).2 > 1000).unwrap();
    let before = geometry(&conn, win);

    let net_wm_state = atom(&conn, b"_NET_WM_STATE").unwrap();
    let fullscreen = atom(&conn, b"_NET_WM_STATE_FULLSCREEN").unwrap();
    let toggle = || {
        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window: win,
            type_: net_wm_state,
            // 2 = toggle
            data: ClientMessageData::from([2u32, fullscreen, 0, 0, 0]),
        };
        conn.send_event(
            false,
            root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )
        .unwrap();
        conn.flush().unwrap();
    };

    toggle();
    harness
        .wait_for(|| geometry(&conn, win) == (0, 0, 1280, 800))
        .expect("client never went fullscreen");
    toggle();
    harness
        .wait_for(|| geometry(&conn, win) == before)
        .expect("geometry was not restored after leaving fullscreen");
}

#[test]
fn urgency_hint_on_focused_client_is_cleared() {
    let Some(harness) = TestHarness::with_wm(97) else {
        return;
    };
    let (conn, screen_num) = harness.connect().unwrap();
    let win = harness.spawn_client(&conn, screen_num);

    // A lone client is focused; raising XUrgencyHint on it must be
    // answered by rewriting WM_HINTS with the bit stripped.
    let urgency = 1u32 << 8;
    let hints = [urgency, 0, 0, 0, 0, 0, 0, 0, 0];
    use x11rb::wrapper::ConnectionExt as _;
    conn.change_property32(
        PropMode::REPLACE,
        win,
        AtomEnum::WM_HINTS,
        AtomEnum::WM_HINTS,
        &hints,
    )
    .unwrap();
    conn.flush().unwrap();

    harness
        .wait_for(|| {
            conn.get_property(false, win, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)
                .ok()
                .and_then(|c| c.reply().ok())
                .and_then(|r| r.value32().and_then(|mut v| v.next()))
                .map(|flags| flags & urgency == 0)
                .unwrap_or(false)
        })
        .expect("urgency hint was never cleared on the focused client");
}

#[test]
fn ctl_reload_and_quit() {
    let Some(mut harness) = TestHarness::with_wm(94) else {
        return;
    };
    assert!(harness.ctl("reload").success());
    assert!(harness.ctl("quit").success());

    let wm = harness.wm.as_mut().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut exited = false;
    while Instant::now() < deadline {
        if wm.try_wait().unwrap().is_some() {
            exited = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(exited, "window manager did not exit after quit");
    harness.wm = None;
}

#[test]
fn ctl_fails_without_a_wm() {
    let Some(harness) = TestHarness::xvfb_only(95) else {
        return;
    };
    assert!(!harness.ctl("quit").success());
}
