//! Command-line entry points: the HTTP server and administrative bootstrap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "accounts")]
#[command(author, version, about = "Account service: signup, login and signed session tokens", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create an account with staff and superuser flags set
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from the environment so it stays out of shell history
        #[arg(long, env = "ACCOUNTS_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Grant staff and superuser flags to an existing account
    Promote {
        #[arg(long)]
        email: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["accounts"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn create_superuser_takes_flags() {
        let cli = Cli::try_parse_from([
            "accounts",
            "create-superuser",
            "--username",
            "root",
            "--email",
            "root@example.com",
            "--password",
            "pw",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::CreateSuperuser { username, email, .. }) => {
                assert_eq!(username, "root");
                assert_eq!(email, "root@example.com");
            }
            _ => panic!("expected create-superuser"),
        }
    }
}
