#![forbid(unsafe_code)]

//! Binary entry point: wire the switcher to a real terminal and a real
//! kitty, or run the `preview` debugging subcommand.

use std::io::{self, BufWriter, Read, Write};
use std::process::ExitCode;

use tabflip::cli::{self, Command, PreviewArgs, SwitchArgs};
use tabflip::command_socket::{self, CommandServer};
use tabflip::host::{HostControl, KittyHost};
use tabflip::session::{EventMux, SessionGuard, TtyInput, resize_flag};
use tabflip::store::{MruStore, PreviewStore};
use tabflip::switcher::{SWITCHER_TITLE, SessionConfig, Switcher, run_session};
use tabflip::theme::{THEME_ENV_VAR, load_theme};
use tabflip_core::logging::{info, warn};
use tabflip_core::modifier_oracle::{
    ModifierOracle, ModifierProbe, PollFn, platform_probes,
};
use tabflip_preview::render_block_preview;

fn main() -> ExitCode {
    tabflip::logging::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::parse(&args) {
        Ok(Command::Switch(switch)) => run_switch(&switch),
        Ok(Command::Preview(preview)) => run_preview(&preview),
        Err(err) => {
            eprintln!("tabflip: {err}");
            ExitCode::from(2)
        }
    }
}

fn run_switch(args: &SwitchArgs) -> ExitCode {
    let theme_path = args.theme_path.clone().or_else(|| {
        std::env::var(THEME_ENV_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Into::into)
    });
    let theme = load_theme(theme_path.as_deref());

    let host = KittyHost::from_env();
    let (group_id, tabs) = match host.list_tabs() {
        Ok(listing) => listing,
        Err(err) => {
            warn!(%err, "tab listing failed");
            (0, Vec::new())
        }
    };
    if tabs.is_empty() {
        info!("no tabs, nothing to switch");
        return ExitCode::SUCCESS;
    }

    // A running session wins: relay the gesture to it and get out of the
    // way.
    if command_socket::try_send(group_id, args.direction.command()) {
        return ExitCode::SUCCESS;
    }

    let mru_store = MruStore::new(group_id);
    let preview_store = PreviewStore::new(group_id);
    let persisted = mru_store.load();

    let mut probes = vec![host_modifier_probe(host.clone())];
    probes.extend(platform_probes());
    let oracle = ModifierOracle::resolve(probes);

    let invoking_window = Some(host.current_window_id()).filter(|w| *w != 0);
    let mut switcher = Switcher::new(
        host,
        theme,
        SessionConfig {
            direction: args.direction,
            group_id,
            invoking_window,
        },
        tabs,
        &persisted,
        oracle,
        mru_store,
        preview_store,
    );

    let server = match CommandServer::bind(group_id) {
        Ok(server) => Some(server),
        Err(err) => {
            warn!(%err, "command socket unavailable, running without relay");
            None
        }
    };

    match run_terminal_session(&mut switcher, server.as_ref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            warn!(%err, "terminal session failed");
            eprintln!("tabflip: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_terminal_session<H: HostControl>(
    switcher: &mut Switcher<H>,
    server: Option<&CommandServer>,
) -> io::Result<()> {
    let mut input = TtyInput::open()?;
    let mut mux = EventMux::new(&input, server)?;
    let resize = resize_flag();
    // The guard restores every terminal mode on drop, error paths included.
    let _guard = SessionGuard::enter(SWITCHER_TITLE)?;
    let mut out = BufWriter::new(io::stdout());
    let outcome = run_session(switcher, &mut input, &mut mux, server, &resize, &mut out)?;
    info!(?outcome, "session finished");
    Ok(())
}

/// First oracle probe: ask the host for a live modifier bitmask. Resolves
/// only when the host answers at probe time.
fn host_modifier_probe(host: KittyHost) -> ModifierProbe {
    ModifierProbe::new("host-modifier-state", move || {
        host.poll_modifier_state()?;
        let poll: PollFn = Box::new(move || host.poll_modifier_state());
        Some(poll)
    })
}

fn run_preview(args: &PreviewArgs) -> ExitCode {
    let text = match &args.file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("tabflip: cannot read {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut buf = String::new();
            if let Err(err) = io::stdin().read_to_string(&mut buf) {
                eprintln!("tabflip: cannot read stdin: {err}");
                return ExitCode::FAILURE;
            }
            buf
        }
    };
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let preview = render_block_preview(&lines, args.cols, args.rows, args.color_mode);
    let mut out = io::stdout().lock();
    for line in preview {
        if writeln!(out, "{line}").is_err() {
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
