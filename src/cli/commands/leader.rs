use clap::{Arg, Command};

// Settings for talking to the leader domain.
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("leader-token")
                .long("leader-token")
                .help("Token presented to the leader cluster on lookup calls")
                .env("CVA_LEADER_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("tls-refresh-interval")
                .long("tls-refresh-interval")
                .help("Seconds between checks of the configured CA bundle")
                .default_value("30")
                .env("CVA_TLS_REFRESH_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("request-timeout")
                .long("request-timeout")
                .help("Seconds to wait for a leader response")
                .default_value("30")
                .env("CVA_REQUEST_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("max-lease-ttl")
                .long("max-lease-ttl")
                .help("Ceiling for minted token lifetimes, example: 768h")
                .default_value("768h")
                .env("CVA_MAX_LEASE_TTL")
                .value_parser(|value: &str| humantime::parse_duration(value)),
        )
}
