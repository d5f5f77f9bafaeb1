//! Terminal lifecycle and crash reporting.
//!
//! [`install_hooks`] must run before [`enter`]: ratatui's init wraps the
//! current panic hook with a terminal restore, so the report below is
//! printed to a sane screen.

use color_eyre::eyre::Result;
use ratatui::DefaultTerminal;

pub fn install_hooks() -> Result<()> {
    let (_, eyre_hook) = color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;

    std::panic::set_hook(Box::new(|info| {
        #[cfg(debug_assertions)]
        better_panic::Settings::auto()
            .most_recent_first(false)
            .lineno_suffix(true)
            .create_panic_handler()(info);

        #[cfg(not(debug_assertions))]
        {
            let meta = human_panic::metadata!();
            let report = human_panic::handle_dump(&meta, info);
            let _ = human_panic::print_msg(report, &meta);
        }
    }));

    Ok(())
}

/// Raw mode on the alternate screen.
pub fn enter() -> Result<DefaultTerminal> {
    let mut terminal = ratatui::try_init()?;
    terminal.clear()?;
    Ok(terminal)
}

pub fn leave() {
    ratatui::restore();
}
