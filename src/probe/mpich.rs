//! MPICH and MVAPICH: the Hydra `mpiexec --version` banner and `mpi.h`.
//!
//! Hydra prints something like:
//!
//! ```text
//! HYDRA build details:
//!     Version:                                 3.2
//!     Release Date:                            Wed Nov 11 22:06:48 CST 2015
//!     CC:                              gcc
//!     Configure options:                       '--disable-option-checking' '--prefix=/opt/mpich-3.2' '--enable-cuda'
//! ```
//!
//! MVAPICH ships the very same launcher, so the flavour is decided by the
//! version macros in the installed `mpi.h`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::ProbeError;
use crate::core::{Binding, Flavor};

static CONFIGURE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Configure options:[ \t]*(.*)$").expect("valid regex"));
static QUOTED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']+)'").expect("valid regex"));
static VERSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Version:\s+(\S+)").expect("valid regex"));
static MVAPICH_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*#\s*define\s+MVAPICH2_VERSION\s+"([^"]+)""#).expect("valid regex")
});
static MPICH_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*#\s*define\s+MPICH_VERSION\s+"([^"]+)""#).expect("valid regex")
});

/// Marker that identifies an MVAPICH `mpi.h`.
pub const MVAPICH_MARKER: &str = "MVAPICH2_VERSION";

/// What the Hydra banner tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydraBanner {
    pub version: String,
    pub configure_flags: Vec<String>,
}

/// Version macros from an MVAPICH `mpi.h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvapichHeader {
    pub version: String,
    pub mpich_version: String,
}

/// Parse the Hydra banner printed by `mpiexec --version`.
pub fn parse_banner(launcher: &Path, banner: &str) -> Result<HydraBanner, ProbeError> {
    let missing = |field: &'static str| ProbeError::MissingField {
        tool: launcher.to_path_buf(),
        field,
    };

    let configure_line = CONFIGURE_LINE
        .captures(banner)
        .and_then(|c| c.get(1))
        .ok_or_else(|| missing("Configure options"))?
        .as_str();

    let configure_flags = QUOTED_TOKEN
        .captures_iter(configure_line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let version = VERSION_LINE
        .captures(banner)
        .and_then(|c| c.get(1))
        .ok_or_else(|| missing("Version"))?
        .as_str()
        .to_string();

    Ok(HydraBanner {
        version,
        configure_flags,
    })
}

/// Whether header text belongs to MVAPICH.
pub fn is_mvapich_header(header: &str) -> bool {
    header.contains(MVAPICH_MARKER)
}

/// Extract the MVAPICH and base MPICH versions from `mpi.h`.
pub fn parse_mvapich_header(mpi_h: &Path, header: &str) -> Result<MvapichHeader, ProbeError> {
    let capture = |re: &Regex, field: &'static str| {
        re.captures(header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ProbeError::MissingField {
                tool: mpi_h.to_path_buf(),
                field,
            })
    };

    Ok(MvapichHeader {
        version: capture(&MVAPICH_VERSION, "MVAPICH2_VERSION")?,
        mpich_version: capture(&MPICH_VERSION, "MPICH_VERSION")?,
    })
}

/// CUDA support as far as the configure flags say.
pub fn cuda_from_flags(flags: &[String]) -> Option<bool> {
    let mut cuda = None;
    for flag in flags {
        if flag.starts_with("--enable-cuda") || flag.starts_with("--with-cuda") {
            cuda = Some(true);
        } else if flag.starts_with("--disable-cuda") || flag.starts_with("--without-cuda") {
            cuda = Some(false);
        }
    }
    cuda
}

/// Bindings inferred from the compiler wrappers present in `bin/`.
pub fn bindings_from_wrappers(bin: &Path) -> BTreeSet<Binding> {
    let has = |names: &[&str]| names.iter().any(|n| bin.join(n).exists());

    let mut bindings = BTreeSet::new();
    if has(&["mpicc"]) {
        bindings.insert(Binding::C);
    }
    if has(&["mpicxx", "mpic++"]) {
        bindings.insert(Binding::Cxx);
    }
    if has(&["mpifort", "mpif90", "mpif77"]) {
        bindings.insert(Binding::Fortran);
    }
    bindings
}

/// Build the MPICH or MVAPICH record for `prefix` from an already captured banner.
pub fn flavor(prefix: &Path, launcher: &Path, banner: &str) -> Result<Flavor> {
    let hydra = parse_banner(launcher, banner)?;
    let bindings = bindings_from_wrappers(&prefix.join("bin"));
    let cuda = cuda_from_flags(&hydra.configure_flags);

    let mpi_h = prefix.join("include").join("mpi.h");
    let header = read_header(&mpi_h)?;

    if is_mvapich_header(&header) {
        let mv = parse_mvapich_header(&mpi_h, &header)?;
        Ok(Flavor::Mvapich {
            version: mv.version,
            mpich_version: mv.mpich_version,
            configure_flags: hydra.configure_flags,
            bindings,
            cuda,
        })
    } else {
        Ok(Flavor::Mpich {
            version: hydra.version,
            configure_flags: hydra.configure_flags,
            bindings,
            cuda,
        })
    }
}

/// Text of `mpi.h`, or an empty string when there is none.
///
/// Runtime-only installs ship no headers and count as MPICH. Vendor headers
/// are not always UTF-8, so the bytes are decoded lossily.
fn read_header(mpi_h: &Path) -> Result<String> {
    match std::fs::read(mpi_h) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", mpi_h.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "\
HYDRA build details:
    Version:                                 3.2
    Release Date:                            Wed Nov 11 22:06:48 CST 2015
    CC:                              gcc
    Configure options:                       '--disable-option-checking' '--prefix=/opt/mpich-3.2' '--enable-cuda' 'CFLAGS=-O2 -g'
    Process Manager:                         pmi
    Launchers available:                     ssh rsh fork slurm ll lsf sge manual persist
";

    const MVAPICH_H: &str = "\
/* mpi.h */
#define MPICH_NAME 3
#define MPICH_VERSION \"3.2\"
#define MVAPICH2_VERSION \"2.3a\"
#define MVAPICH2_NUMVERSION 20300000
";

    #[test]
    fn test_parse_banner() {
        let hydra = parse_banner(Path::new("mpiexec"), BANNER).unwrap();
        assert_eq!(hydra.version, "3.2");
        assert_eq!(
            hydra.configure_flags,
            vec![
                "--disable-option-checking",
                "--prefix=/opt/mpich-3.2",
                "--enable-cuda",
                "CFLAGS=-O2 -g",
            ]
        );
        assert_eq!(cuda_from_flags(&hydra.configure_flags), Some(true));
    }

    #[test]
    fn test_banner_without_version_is_error() {
        let banner = "HYDRA build details:\n    Configure options: '--prefix=/x'\n";
        let err = parse_banner(Path::new("/opt/x/bin/mpiexec"), banner).unwrap_err();
        assert!(matches!(err, ProbeError::MissingField { field: "Version", .. }));
        assert!(err.to_string().contains("/opt/x/bin/mpiexec"));
    }

    #[test]
    fn test_banner_without_configure_line_is_error() {
        let banner = "HYDRA build details:\n    Version: 3.2\n";
        let err = parse_banner(Path::new("mpiexec"), banner).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::MissingField {
                field: "Configure options",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_configure_options() {
        let banner = "    Version: 3.3a\n    Configure options:\n";
        let hydra = parse_banner(Path::new("mpiexec"), banner).unwrap();
        assert_eq!(hydra.version, "3.3a");
        assert!(hydra.configure_flags.is_empty());
    }

    #[test]
    fn test_mvapich_header() {
        assert!(is_mvapich_header(MVAPICH_H));
        assert!(!is_mvapich_header("#define MPICH_VERSION \"3.2\"\n"));

        let mv = parse_mvapich_header(Path::new("mpi.h"), MVAPICH_H).unwrap();
        assert_eq!(mv.version, "2.3a");
        assert_eq!(mv.mpich_version, "3.2");
    }

    #[test]
    fn test_cuda_unknown_without_flags() {
        assert_eq!(cuda_from_flags(&["--prefix=/x".to_string()]), None);
        assert_eq!(cuda_from_flags(&["--without-cuda".to_string()]), Some(false));
    }

    #[cfg(unix)]
    #[test]
    fn test_latin1_mvapich_header() {
        use crate::core::MpiKind;
        use crate::test_support::FakeMpi;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let prefix = FakeMpi::mvapich("2.3a", "3.2").create(&tmp.path().join("mv"));
        let mpi_h = prefix.join("include/mpi.h");
        let mut header = b"/* Copyright \xa9 OSU */\n".to_vec();
        header.extend(std::fs::read(&mpi_h).unwrap());
        std::fs::write(&mpi_h, header).unwrap();

        let installation = crate::probe::require(&prefix).unwrap();
        assert_eq!(installation.kind(), MpiKind::Mvapich);
        assert_eq!(installation.version(), "2.3a");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_header_is_error() {
        use crate::test_support::FakeMpi;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let prefix = FakeMpi::mpich("3.2").create(&tmp.path().join("mpich"));
        let mpi_h = prefix.join("include/mpi.h");
        std::fs::remove_file(&mpi_h).unwrap();
        std::fs::create_dir(&mpi_h).unwrap();

        let err = crate::probe::require(&prefix).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runtime_only_is_mpich() {
        use crate::core::MpiKind;
        use crate::test_support::FakeMpi;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let prefix = FakeMpi::mvapich("2.3a", "3.2")
            .runtime_only()
            .create(&tmp.path().join("mv"));

        let installation = crate::probe::require(&prefix).unwrap();
        assert_eq!(installation.kind(), MpiKind::Mpich);
    }
}
