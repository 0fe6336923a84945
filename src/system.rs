use crate::constants::{DEV_PREFIX, UNKNOWN_TTY, UTMP_PATHS};
use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// host facts shown next to the repository status
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub load: LoadAverage,
    pub os: String,
    pub version: String,
    pub tty: String,
    pub users: usize,
}

impl SystemInfo {
    /// query every provider; any failure aborts the whole snapshot
    ///
    /// `utmp` overrides the login database, which is otherwise looked up in
    /// the platform's usual locations
    pub fn gather(utmp: Option<&Path>) -> Result<Self> {
        let (os, version) = platform().context("could not obtain platform information")?;
        let load = load_average().context("could not get load average")?;
        let users = utmp_database(utmp)
            .and_then(|database| user_count(&database))
            .context("could not enumerate users")?;
        let tty = terminal();

        Ok(Self {
            load,
            os,
            version,
            tty,
            users,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

impl fmt::Display for LoadAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {:.2} {:.2}", self.one, self.five, self.fifteen)
    }
}

pub fn load_average() -> Result<LoadAverage> {
    let mut samples = [0f64; 3];
    // SAFETY: the buffer has room for exactly the three samples requested
    let count = unsafe { libc::getloadavg(samples.as_mut_ptr(), 3) };
    if count < 3 {
        bail!("getloadavg returned {count} samples");
    }

    Ok(LoadAverage {
        one: samples[0],
        five: samples[1],
        fifteen: samples[2],
    })
}

/// display name and version of the running os
///
/// macos reports its product version, everything else the kernel release
pub fn platform() -> Result<(String, String)> {
    let os = std::env::consts::OS;
    let version = if os == "macos" {
        product_version()?
    } else {
        kernel_release()?
    };
    Ok((os_display_name(os), version))
}

fn kernel_release() -> Result<String> {
    let uts = nix::sys::utsname::uname().context("uname failed")?;
    Ok(uts.release().to_string_lossy().to_string())
}

fn product_version() -> Result<String> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .context("failed to run sw_vers")?;
    if !output.status.success() {
        bail!("sw_vers failed with exit code: {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn os_display_name(os: &str) -> String {
    match os {
        "darwin" | "macos" => String::from("MacOS"),
        other => title_case(other),
    }
}

/// upper-case the first letter of every word
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

/// the login database to read; a missing database is an error, not zero users
pub fn utmp_database(utmp: Option<&Path>) -> Result<PathBuf> {
    match utmp {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => bail!("no utmp database at {}", path.display()),
        None => UTMP_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.is_file())
            .map(Path::to_path_buf)
            .with_context(|| format!("no utmp database in {}", UTMP_PATHS.join(", "))),
    }
}

/// number of login sessions in the utmpx database at `database`
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn user_count(database: &Path) -> Result<usize> {
    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let name = CString::new(database.as_os_str().as_bytes())
            .context("utmp path contains a nul byte")?;
        // SAFETY: `name` is a valid nul-terminated string that outlives the call
        if unsafe { libc::utmpxname(name.as_ptr()) } != 0 {
            bail!("failed to select utmp database {}", database.display());
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = database;

    let mut count = 0;
    // SAFETY: entries returned by getutxent are only read before the next call,
    // and the database is rewound and closed around the scan
    unsafe {
        libc::setutxent();
        loop {
            let entry = libc::getutxent();
            if entry.is_null() {
                break;
            }
            if (*entry).ut_type == libc::USER_PROCESS {
                count += 1;
            }
        }
        libc::endutxent();
    }
    Ok(count)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn user_count(_database: &Path) -> Result<usize> {
    bail!("user enumeration is not supported on this platform")
}

/// controlling terminal of the parent shell, without the `/dev/` prefix
pub fn terminal() -> String {
    let raw = parent_terminal()
        .or_else(|_| tty_command())
        .unwrap_or_else(|_| UNKNOWN_TTY.to_string());
    format_tty(&raw)
}

/// strip one leading `/dev/` (or a lone leading `/`); interior slashes stay
pub fn format_tty(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix(DEV_PREFIX)
        .or_else(|| raw.strip_prefix('/'))
        .unwrap_or(raw)
        .to_string()
}

/// ask `tty` about our stdin, capturing stdout and stderr together
fn tty_command() -> Result<String> {
    let output = Command::new("tty")
        .stdin(Stdio::inherit())
        .output()
        .context("failed to run tty")?;
    if !output.status.success() {
        bail!("tty failed with exit code: {}", output.status);
    }

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(String::from_utf8_lossy(&combined).trim().to_string())
}

#[cfg(target_os = "linux")]
fn parent_terminal() -> Result<String> {
    use std::fs;

    let ppid = std::os::unix::process::parent_id();
    let stat = fs::read_to_string(format!("/proc/{ppid}/stat"))
        .with_context(|| format!("failed to read stat of process {ppid}"))?;
    let tty_nr = parse_tty_nr(&stat)?;
    if tty_nr == 0 {
        bail!("process {ppid} has no controlling terminal");
    }

    let wanted = decode_tty_nr(tty_nr);
    find_terminal_device(wanted)
        .with_context(|| format!("no terminal device matches {}:{}", wanted.0, wanted.1))
}

#[cfg(not(target_os = "linux"))]
fn parent_terminal() -> Result<String> {
    bail!("parent terminal lookup is not supported on this platform")
}

/// `tty_nr`, the seventh field of `/proc/<pid>/stat`
///
/// the command name in field two may itself contain spaces and parentheses,
/// so fields are counted from the last `)`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_tty_nr(stat: &str) -> Result<u32> {
    let (_, rest) = stat.rsplit_once(')').context("malformed process stat")?;
    let field = rest
        .split_whitespace()
        .nth(4)
        .context("process stat has no tty_nr field")?;
    let tty_nr: i32 = field
        .parse()
        .with_context(|| format!("invalid tty_nr {field:?}"))?;
    Ok(tty_nr as u32)
}

/// (major, minor) from the kernel's `tty_nr` encoding
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn decode_tty_nr(tty_nr: u32) -> (u32, u32) {
    let major = (tty_nr >> 8) & 0xfff;
    let minor = (tty_nr & 0xff) | ((tty_nr >> 12) & 0xfff00);
    (major, minor)
}

/// (major, minor) from a glibc `dev_t` as returned by `stat`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn decode_rdev(rdev: u64) -> (u32, u32) {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & 0xffff_f000);
    let minor = (rdev & 0xff) | ((rdev >> 12) & 0xffff_ff00);
    (major as u32, minor as u32)
}

#[cfg(target_os = "linux")]
fn find_terminal_device(wanted: (u32, u32)) -> Option<String> {
    use std::fs;
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let candidates = fs::read_dir("/dev/pts")
        .into_iter()
        .flatten()
        .chain(fs::read_dir("/dev").into_iter().flatten())
        .flatten();

    for entry in candidates {
        let path = entry.path();
        let in_pts = path.parent().is_some_and(|p| p.ends_with("pts"));
        let is_tty = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("tty"));
        if !(in_pts || is_tty) {
            continue;
        }

        if let Ok(metadata) = fs::metadata(&path)
            && metadata.file_type().is_char_device()
            && decode_rdev(metadata.rdev()) == wanted
        {
            return Some(path.to_string_lossy().to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_average_uses_two_decimals() {
        let load = LoadAverage {
            one: 0.5,
            five: 1.234,
            fifteen: 12.0,
        };
        assert_eq!(load.to_string(), "0.50 1.23 12.00");
    }

    #[test]
    fn reads_real_load_average() {
        let load = load_average().unwrap();
        assert!(load.one >= 0.0 && load.five >= 0.0 && load.fifteen >= 0.0);
    }

    #[test]
    fn os_names_are_title_cased() {
        assert_eq!(os_display_name("linux"), "Linux");
        assert_eq!(os_display_name("freebsd"), "Freebsd");
        assert_eq!(os_display_name("darwin"), "MacOS");
        assert_eq!(os_display_name("macos"), "MacOS");
    }

    #[test]
    fn title_case_capitalises_each_word() {
        assert_eq!(title_case("gnu linux"), "Gnu Linux");
        assert_eq!(title_case("dragon-fly bsd"), "Dragon-Fly Bsd");
        assert_eq!(title_case("snake_case"), "Snake_case");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn tty_strips_only_dev_prefix() {
        assert_eq!(format_tty("/dev/pts/3\n"), "pts/3");
        assert_eq!(format_tty("/dev/ttys001"), "ttys001");
        assert_eq!(format_tty("/pts/0"), "pts/0");
        assert_eq!(format_tty("pts/0"), "pts/0");
        assert_eq!(format_tty("/dev/dev/tty1"), "dev/tty1");
        assert_eq!(format_tty("?"), "?");
    }

    #[test]
    fn tty_nr_is_read_after_command_name() {
        let stat = "1234 (my (odd) shell) S 1 1234 1234 34816 1234 4194560 0 0";
        assert_eq!(parse_tty_nr(stat).unwrap(), 34816);
        assert!(parse_tty_nr("1234 (sh) S 1").is_err());
        assert!(parse_tty_nr("garbage").is_err());
    }

    #[test]
    fn decodes_device_numbers() {
        // /dev/pts/0: major 136, minor 0
        assert_eq!(decode_tty_nr(34816), (136, 0));
        // /dev/pts/300: minor spills into the high bits
        assert_eq!(decode_tty_nr((136 << 8) | (300 & 0xff) | ((300 & !0xff) << 12)), (136, 300));
        assert_eq!(decode_rdev((136 << 8) | 5), (136, 5));
        assert_eq!(decode_rdev((136 << 8) | (300 & 0xff) | ((300 & !0xff) << 12)), (136, 300));
    }

    #[test]
    fn missing_utmp_database_is_an_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("utmp");
        let err = utmp_database(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("no utmp database"));
        assert!(utmp_database(Some(temp_dir.path())).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn empty_utmp_database_has_no_users() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let database = temp_dir.path().join("utmp");
        std::fs::write(&database, b"").unwrap();

        let selected = utmp_database(Some(&database)).unwrap();
        assert_eq!(selected, database);
        assert_eq!(user_count(&selected).unwrap(), 0);
    }

    #[test]
    fn terminal_always_yields_a_value() {
        let tty = terminal();
        assert!(!tty.is_empty());
        assert!(!tty.starts_with('/'));
    }
}
