//! Operator-facing output. Human lines go to stderr; machine-readable results go to stdout.

use std::io::{BufRead as _, IsTerminal as _, Write as _};

fn stderr_write(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    let _flush = stderr.flush();
}

pub fn stderr_writeln(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    if stderr.write_all(b"\n").is_err() {
        return;
    }
    let _flush = stderr.flush();
}

/// Pretty JSON on stdout.
pub fn print_json(v: &serde_json::Value) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(s.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

pub fn print_balances(native: &str, usdc: Option<&str>) {
    stderr_writeln(&format!("Balance native : {native}"));
    match usdc {
        Some(u) => stderr_writeln(&format!("Balance USDC   : {u}")),
        None => stderr_writeln("Balance USDC   : unavailable (check the token address)"),
    }
}

pub fn print_swap_plan(amount: &str, loops: u32, slippage_pct: &str, dry_run: bool) {
    let mode = if dry_run { "dry run (nothing is sent)" } else { "live" };
    stderr_writeln(&format!(
        "Swap plan\n=========\nAmount per swap : {amount}\nLoops           : {loops}\nSlippage        : {slippage_pct}%\nRoute           : native -> USDC\nMode            : {mode}"
    ));
}

/// Prompt on stderr to confirm the swap run, or bail if non-interactive.
pub fn confirm_swap_or_bail(yes: bool) -> eyre::Result<()> {
    if yes {
        return Ok(());
    }
    let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
    if !interactive {
        eyre::bail!("refusing to swap non-interactively; pass --yes");
    }

    stderr_write("Proceed with the swaps? [y/N] ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| eyre::eyre!("read confirmation: {e}"))?;
    let ans = line.trim().to_ascii_lowercase();
    if ans == "y" || ans == "yes" {
        Ok(())
    } else {
        eyre::bail!("swap cancelled")
    }
}
