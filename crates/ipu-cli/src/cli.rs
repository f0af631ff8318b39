//! Argument definitions

use clap::{Arg, ArgAction, ArgMatches, Command};

/// Build the `ipu` command
#[must_use]
pub fn command() -> Command {
    Command::new("ipu")
        .version(env!("CARGO_PKG_VERSION"))
        .about("In-place operating system upgrade")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(run_args(
            Command::new("preupgrade").about("Analyse the system and report upgrade blockers"),
        ))
        .subcommand(run_args(
            Command::new("upgrade").about("Upgrade the system in place"),
        ))
        .subcommand(
            Command::new("answer")
                .about("Record answers for actors that need a decision")
                .arg(
                    Arg::new("section")
                        .long("section")
                        .required(true)
                        .action(ArgAction::Append)
                        .value_name("SCOPE.KEY=VALUE")
                        .help("Answer to record; may be repeated"),
                ),
        )
}

fn run_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("resume")
            .long("resume")
            .action(ArgAction::SetTrue)
            .help("Continue the most recent run of this command"),
    )
    .arg(
        Arg::new("debug")
            .long("debug")
            .action(ArgAction::SetTrue)
            .help("Debug output"),
    )
    .arg(
        Arg::new("verbose")
            .long("verbose")
            .action(ArgAction::SetTrue)
            .help("Informational output"),
    )
    .arg(
        Arg::new("no-rhsm")
            .long("no-rhsm")
            .action(ArgAction::SetTrue)
            .help("Do not use subscription-manager"),
    )
    .arg(
        Arg::new("enablerepo")
            .long("enablerepo")
            .action(ArgAction::Append)
            .value_name("REPOID")
            .help("Enable an additional repository on the target; may be repeated"),
    )
    .arg(
        Arg::new("target")
            .long("target")
            .value_name("VERSION")
            .help("Target version, e.g. 9.6"),
    )
    .arg(
        Arg::new("whitelist-experimental")
            .long("whitelist-experimental")
            .action(ArgAction::Append)
            .value_name("ACTOR")
            .help("Allow an experimental actor to run; may be repeated"),
    )
}

/// Options shared by `preupgrade` and `upgrade`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Continue the most recent run of the same kind
    pub resume: bool,
    /// Debug output
    pub debug: bool,
    /// Informational output
    pub verbose: bool,
    /// Skip subscription-manager
    pub no_rhsm: bool,
    /// Extra target repositories
    pub enable_repos: Vec<String>,
    /// Requested target version
    pub target: Option<String>,
    /// Experimental actors to allow
    pub whitelist_experimental: Vec<String>,
}

impl RunArgs {
    /// Read from the matches of `preupgrade` or `upgrade`
    #[must_use]
    pub fn from_matches(args: &ArgMatches) -> Self {
        let strings = |id: &str| -> Vec<String> {
            args.get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };
        Self {
            resume: args.get_flag("resume"),
            debug: args.get_flag("debug"),
            verbose: args.get_flag("verbose"),
            no_rhsm: args.get_flag("no-rhsm"),
            enable_repos: strings("enablerepo"),
            target: args.get_one::<String>("target").cloned(),
            whitelist_experimental: strings("whitelist-experimental"),
        }
    }

    /// `IPU_*` variables implied by the flags
    ///
    /// Captured with the rest of the environment so a resumed run sees the
    /// same switches.
    #[must_use]
    pub fn implied_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.debug {
            vars.push(("IPU_DEBUG".to_string(), "1".to_string()));
        }
        if self.verbose {
            vars.push(("IPU_VERBOSE".to_string(), "1".to_string()));
        }
        if self.no_rhsm {
            vars.push(("IPU_NO_RHSM".to_string(), "1".to_string()));
        }
        if !self.enable_repos.is_empty() {
            vars.push(("IPU_ENABLE_REPOS".to_string(), self.enable_repos.join(",")));
        }
        if let Some(target) = &self.target {
            vars.push(("IPU_TARGET_VERSION".to_string(), target.clone()));
        }
        vars
    }
}
