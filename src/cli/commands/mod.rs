mod leader;
mod logging;

pub use logging::validator_log_level;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("cross-vault-auth")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CVA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("storage-dir")
                .long("storage-dir")
                .help("Directory holding configuration and role records")
                .long_help(
                    "Directory holding configuration and role records. Records are kept in memory when unset.",
                )
                .env("CVA_STORAGE_DIR"),
        )
        .arg(
            Arg::new("admin-token")
                .long("admin-token")
                .help("Bearer token required on the config and role routes")
                .env("CVA_ADMIN_TOKEN")
                .hide_env_values(true),
        );

    let command = leader::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "cross-vault-auth");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("CVA_PORT", None::<&str>),
                ("CVA_STORAGE_DIR", None),
                ("CVA_TLS_REFRESH_INTERVAL", None),
                ("CVA_REQUEST_TIMEOUT", None),
                ("CVA_MAX_LEASE_TTL", None),
                ("CVA_LOG_LEVEL", None),
            ],
            || {
                let matches = new().get_matches_from(vec!["cross-vault-auth"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert_eq!(matches.get_one::<String>("storage-dir"), None);
                assert_eq!(
                    matches.get_one::<u64>("tls-refresh-interval").copied(),
                    Some(30)
                );
                assert_eq!(matches.get_one::<u64>("request-timeout").copied(), Some(30));
                assert_eq!(
                    matches.get_one::<Duration>("max-lease-ttl").copied(),
                    Some(Duration::from_secs(768 * 3600))
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(0));
            },
        );
    }

    #[test]
    fn test_check_args() {
        let matches = new().get_matches_from(vec![
            "cross-vault-auth",
            "--port",
            "8200",
            "--storage-dir",
            "/var/lib/cva",
            "--leader-token",
            "s.leader",
            "--admin-token",
            "admin",
            "--tls-refresh-interval",
            "5",
            "--max-lease-ttl",
            "1h 30m",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8200));
        assert_eq!(
            matches.get_one::<String>("storage-dir").cloned(),
            Some("/var/lib/cva".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("leader-token").cloned(),
            Some("s.leader".to_string())
        );
        assert_eq!(
            matches.get_one::<u64>("tls-refresh-interval").copied(),
            Some(5)
        );
        assert_eq!(
            matches.get_one::<Duration>("max-lease-ttl").copied(),
            Some(Duration::from_secs(5400))
        );
    }

    #[test]
    fn test_zero_refresh_interval_is_rejected() {
        let result = new().try_get_matches_from(vec![
            "cross-vault-auth",
            "--tls-refresh-interval",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CVA_PORT", Some("443")),
                ("CVA_STORAGE_DIR", Some("/tmp/cva")),
                ("CVA_LEADER_TOKEN", Some("s.leader")),
                ("CVA_REQUEST_TIMEOUT", Some("3")),
                ("CVA_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["cross-vault-auth"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("storage-dir").cloned(),
                    Some("/tmp/cva".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("leader-token").cloned(),
                    Some("s.leader".to_string())
                );
                assert_eq!(matches.get_one::<u64>("request-timeout").copied(), Some(3));
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("CVA_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["cross-vault-auth"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5usize {
            temp_env::with_vars([("CVA_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["cross-vault-auth".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_validator_log_level_rejects_unknown() {
        let command = Command::new("t").arg(
            Arg::new("level")
                .long("level")
                .value_parser(validator_log_level()),
        );
        assert!(command
            .try_get_matches_from(vec!["t", "--level", "loud"])
            .is_err());
    }
}
