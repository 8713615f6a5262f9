use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // LPG_BLOCKCYPHER_TOKEN is left out on purpose
    const DISPLAY_ENVS: [&str; 22] = [
        "RUST_LOG",
        "LPG_HOST",
        "LPG_PORT",
        "LPG_DATABASE_URL",
        "LPG_ADDRESS_MODE",
        "LPG_MERCHANT_ADDRESS",
        "LPG_XPUB",
        "LPG_ADDRESS_HRP",
        "LPG_MIN_CONFIRMATIONS",
        "LPG_MATCH_TOLERANCE",
        "LPG_OFFSET_MIN",
        "LPG_OFFSET_MAX",
        "LPG_POLL_INTERVAL",
        "LPG_REQUEST_TIMEOUT",
        "LPG_ACTIVITY_WINDOW",
        "LPG_UNPAID_ORDER_TIMEOUT",
        "LPG_FIAT_CURRENCY",
        "LPG_DEFAULT_RATE",
        "LPG_RATE_MAX_AGE",
        "LPG_BLOCKCYPHER_URL",
        "LPG_COINGECKO_URL",
        "LPG_NOTIFY_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
