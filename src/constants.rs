// environment
pub const SKIP_VCS_ENV: &str = "BASH_PROMPT_SKIP_VCS_CHECK";
pub const VERBOSE_ENV: &str = "BASH_PROMPT_VERBOSE";
pub const HG_PROGRAM_ENV: &str = "HG";
pub const UTMP_ENV: &str = "BASH_PROMPT_UTMP";

// git
pub const GIT_SUFFIX: &str = ".git";
pub const NULL_REVISION: &str = "0000000";

// mercurial
pub const DEFAULT_HG_PROGRAM: &str = "hg";
pub const HG_SUFFIX: &str = "";
pub const HG_REVISION_LENGTH: usize = 7;
pub const HG_DEFAULT_PATH: &str = "default";
pub const HG_SHUTDOWN_TIMEOUT_SECS: u64 = 2;

// users
#[cfg(target_os = "macos")]
pub const UTMP_PATHS: &[&str] = &["/var/run/utmpx"];
#[cfg(not(target_os = "macos"))]
pub const UTMP_PATHS: &[&str] = &["/var/run/utmp", "/run/utmp"];

// terminal
pub const UNKNOWN_TTY: &str = "?";
pub const DEV_PREFIX: &str = "/dev/";
