//! `mpienv install`: build a known MPI release from source.
//!
//! The release tarball is downloaded into the cache directory, unpacked
//! under `<builds>/<name>/`, configured with
//! `--prefix <versions>/mpi/<name>` and installed there with `make`. The
//! result is an in-place registry entry (a real directory, not a link).

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use url::Url;

use crate::core::MpiKind;
use crate::registry::{validate_name, Registry, RegistryError};
use crate::util::fs::{ensure_dir, entry_exists};
use crate::util::process::ProcessBuilder;
use crate::util::{Config, Shell, Status};

/// Environment variable holding extra `./configure` arguments.
pub const CONFIGURE_OPTS_ENV: &str = "MPIENV_CONFIGURE_OPTS";

const TARBALL_SUFFIX: &str = ".tar.gz";

/// A source release mpienv knows how to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Catalog key, also the default entry name (`mpich-3.2`).
    pub key: String,
    pub kind: MpiKind,
    pub version: String,
    pub url: String,
}

impl Release {
    fn new(kind: MpiKind, version: &str) -> Self {
        let (key, url) = match kind {
            MpiKind::OpenMpi => {
                let series = version.rsplitn(2, '.').nth(1).unwrap_or(version);
                (
                    format!("openmpi-{}", version),
                    format!(
                        "https://download.open-mpi.org/release/open-mpi/v{}/openmpi-{}{}",
                        series, version, TARBALL_SUFFIX
                    ),
                )
            }
            MpiKind::Mpich => (
                format!("mpich-{}", version),
                format!(
                    "https://www.mpich.org/static/downloads/{}/mpich-{}{}",
                    version, version, TARBALL_SUFFIX
                ),
            ),
            MpiKind::Mvapich => (
                format!("mvapich-{}", version),
                format!(
                    "https://mvapich.cse.ohio-state.edu/download/mvapich/mv2/mvapich2-{}{}",
                    version, TARBALL_SUFFIX
                ),
            ),
        };

        Release {
            key,
            kind,
            version: version.to_string(),
            url,
        }
    }

    /// File name of the tarball, taken from the URL.
    pub fn tarball_name(&self) -> Result<String> {
        let url = Url::parse(&self.url).with_context(|| format!("invalid URL: {}", self.url))?;
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .with_context(|| format!("no file name in URL: {}", self.url))
    }

    /// Top-level directory inside the tarball.
    pub fn source_dir_name(&self) -> Result<String> {
        let name = self.tarball_name()?;
        Ok(name
            .strip_suffix(TARBALL_SUFFIX)
            .unwrap_or(&name)
            .to_string())
    }
}

/// All known releases, sorted by key.
pub fn catalog() -> Vec<Release> {
    let mut releases = vec![
        Release::new(MpiKind::OpenMpi, "1.10.7"),
        Release::new(MpiKind::OpenMpi, "2.0.3"),
        Release::new(MpiKind::OpenMpi, "2.1.1"),
        Release::new(MpiKind::OpenMpi, "4.1.6"),
        Release::new(MpiKind::OpenMpi, "5.0.5"),
        Release::new(MpiKind::Mpich, "3.1.4"),
        Release::new(MpiKind::Mpich, "3.2"),
        Release::new(MpiKind::Mpich, "3.3a"),
        Release::new(MpiKind::Mpich, "4.2.2"),
        Release::new(MpiKind::Mvapich, "2.2"),
        Release::new(MpiKind::Mvapich, "2.3a"),
        Release::new(MpiKind::Mvapich, "2.3.7"),
    ];
    releases.sort_by(|a, b| a.key.cmp(&b.key));
    releases
}

pub fn find_release(key: &str) -> Option<Release> {
    catalog().into_iter().find(|r| r.key == key)
}

/// Final `./configure` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureArgs {
    pub args: Vec<String>,
    /// A user-supplied `--prefix` was dropped.
    pub prefix_dropped: bool,
    /// Only `--help` is passed; nothing gets built.
    pub help_only: bool,
}

/// Turn user arguments into the `./configure` command line.
///
/// A `--prefix X` pair is removed since mpienv owns the install location.
/// If `--help` is present, only `--help` is passed.
pub fn configure_args(user: &[String], prefix: &Path) -> ConfigureArgs {
    let mut args = user.to_vec();
    let mut prefix_dropped = false;

    if let Some(idx) = args.iter().position(|a| a == "--prefix") {
        let end = (idx + 2).min(args.len());
        args.drain(idx..end);
        prefix_dropped = true;
    }

    if args.iter().any(|a| a == "--help") {
        return ConfigureArgs {
            args: vec!["--help".to_string()],
            prefix_dropped,
            help_only: true,
        };
    }

    args.push("--prefix".to_string());
    args.push(prefix.display().to_string());
    ConfigureArgs {
        args,
        prefix_dropped,
        help_only: false,
    }
}

/// Options for `mpienv install`.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Catalog key.
    pub mpi: String,
    /// Entry name; defaults to the catalog key.
    pub name: Option<String>,
    /// Parallel make jobs; defaults to the config file, then the CPU count.
    pub jobs: Option<usize>,
    /// Raw `MPIENV_CONFIGURE_OPTS`, whitespace separated.
    pub configure_opts: Option<String>,
}

/// How an install finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { name: String, prefix: PathBuf },
    /// `./configure --help` was shown instead of building.
    ConfigureHelp,
}

/// Builds one release into one registry entry.
#[derive(Debug)]
pub struct Installer<'a> {
    shell: &'a Shell,
    release: Release,
    name: String,
    jobs: usize,
    user_args: Vec<String>,
    tarball: PathBuf,
    extract_dir: PathBuf,
    source_dir: PathBuf,
    prefix: PathBuf,
}

impl<'a> Installer<'a> {
    /// Validate `opts` against the registry and work out every path.
    pub fn new(
        registry: &Registry<'_>,
        config: &Config,
        shell: &'a Shell,
        opts: &InstallOptions,
    ) -> Result<Self> {
        let release = find_release(&opts.mpi)
            .with_context(|| format!("unknown MPI: `{}` (see `mpienv install --list`)", opts.mpi))?;

        let name = opts.name.clone().unwrap_or_else(|| release.key.clone());
        validate_name(&name)?;
        if registry.contains(&name) {
            return Err(RegistryError::NameTaken { name }.into());
        }

        let ctx = registry.context();
        let jobs = opts
            .jobs
            .or(config.jobs)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1);

        let user_args = match opts.configure_opts.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                raw.split_whitespace().map(str::to_string).collect()
            }
            _ => config.flavor(release.kind).configure_options.clone(),
        };

        let tarball = ctx.cache_dir().join(release.tarball_name()?);
        let extract_dir = ctx.build_dir().join(&name);
        let source_dir = extract_dir.join(release.source_dir_name()?);
        let prefix = ctx.entry_path(&name);

        Ok(Installer {
            shell,
            release,
            name,
            jobs,
            user_args,
            tarball,
            extract_dir,
            source_dir,
            prefix,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Download, unpack, configure, build and install.
    pub fn run(&self) -> Result<InstallOutcome> {
        self.download()?;
        self.extract()?;

        if !self.configure()? {
            return Ok(InstallOutcome::ConfigureHelp);
        }

        self.shell.status(
            Status::Building,
            format!("{} with {} jobs", self.release.key, self.jobs),
        );
        self.make(&[])?;

        self.shell
            .status(Status::Installing, format!("into {}", self.prefix.display()));
        self.make(&["install"])?;

        if !entry_exists(&self.prefix) {
            bail!(
                "`make install` finished but {} does not exist",
                self.prefix.display()
            );
        }

        tracing::info!("installed {} as `{}`", self.release.key, self.name);
        Ok(InstallOutcome::Installed {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
        })
    }

    /// Fetch the tarball unless it is already cached.
    pub fn download(&self) -> Result<()> {
        if self.tarball.exists() {
            tracing::debug!("using cached {}", self.tarball.display());
            return Ok(());
        }

        let cache_dir = self.tarball.parent().unwrap_or(Path::new("."));
        ensure_dir(cache_dir)?;

        self.shell.status(Status::Downloading, &self.release.url);

        let mut response = reqwest::blocking::get(&self.release.url)
            .with_context(|| format!("failed to download {}", self.release.url))?;

        if !response.status().is_success() {
            bail!(
                "failed to download {}: HTTP {}",
                self.release.url,
                response.status()
            );
        }

        // Write to a temp file first so an interrupted download is never
        // mistaken for a cached tarball.
        let mut tmp = tempfile::NamedTempFile::new_in(cache_dir)
            .with_context(|| format!("failed to create temp file in {}", cache_dir.display()))?;

        let mut progress = self
            .shell
            .bytes_progress(&self.release.key, response.content_length());
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = response
                .read(&mut buf)
                .with_context(|| format!("failed to read {}", self.release.url))?;
            if n == 0 {
                break;
            }
            tmp.write_all(&buf[..n]).context("failed to write download")?;
            progress.inc(n as u64);
        }
        progress.finish();

        tmp.persist(&self.tarball)
            .with_context(|| format!("failed to save {}", self.tarball.display()))?;

        tracing::debug!(
            "downloaded {} bytes to {}",
            progress.position(),
            self.tarball.display()
        );
        Ok(())
    }

    /// Unpack the tarball unless the source directory already exists.
    pub fn extract(&self) -> Result<()> {
        if self.source_dir.exists() {
            tracing::debug!("reusing {}", self.source_dir.display());
            return Ok(());
        }

        self.shell.status(Status::Extracting, self.tarball.display());

        let file = File::open(&self.tarball)
            .with_context(|| format!("failed to open {}", self.tarball.display()))?;
        extract_tarball(BufReader::new(file), &self.extract_dir)
            .with_context(|| format!("failed to extract {}", self.tarball.display()))?;

        if !self.source_dir.is_dir() {
            bail!(
                "{} did not contain {}",
                self.tarball.display(),
                self.source_dir.display()
            );
        }
        Ok(())
    }

    /// Run `./configure`. Returns `false` when only `--help` was requested.
    pub fn configure(&self) -> Result<bool> {
        let conf = configure_args(&self.user_args, &self.prefix);
        if conf.prefix_dropped {
            self.shell.warn("--prefix argument is replaced by mpienv");
        }

        let process = ProcessBuilder::new(self.source_dir.join("configure"))
            .args(&conf.args)
            .cwd(&self.source_dir);

        self.shell.status(Status::Configuring, process.display_command());
        process.status_and_check()?;

        Ok(!conf.help_only)
    }

    fn make(&self, targets: &[&str]) -> Result<()> {
        ProcessBuilder::new("make")
            .args(targets)
            .arg("-j")
            .arg(self.jobs.to_string())
            .cwd(&self.source_dir)
            .status_and_check()
    }
}

/// Extract a gzip-compressed tarball into `dest`.
///
/// Entries that would land outside `dest` are rejected.
pub fn extract_tarball<R: Read>(reader: R, dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);

    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry
            .path()
            .context("failed to get entry path")?
            .into_owned();

        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("failed to extract {}", entry_path.display()))?;
        if !unpacked {
            bail!(
                "tarball entry escapes destination directory: {}",
                entry_path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_catalog_is_sorted_and_contains_classics() {
        let keys: Vec<_> = catalog().into_iter().map(|r| r.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        for key in [
            "openmpi-1.10.7",
            "openmpi-2.0.3",
            "openmpi-2.1.1",
            "mpich-3.1.4",
            "mpich-3.2",
            "mpich-3.3a",
            "mvapich-2.2",
            "mvapich-2.3a",
        ] {
            assert!(keys.iter().any(|k| k == key), "missing {}", key);
        }
    }

    #[test]
    fn test_release_urls() {
        let ompi = find_release("openmpi-2.1.1").unwrap();
        assert_eq!(
            ompi.url,
            "https://download.open-mpi.org/release/open-mpi/v2.1/openmpi-2.1.1.tar.gz"
        );
        assert_eq!(ompi.tarball_name().unwrap(), "openmpi-2.1.1.tar.gz");
        assert_eq!(ompi.source_dir_name().unwrap(), "openmpi-2.1.1");

        let mv = find_release("mvapich-2.3a").unwrap();
        assert_eq!(mv.kind, MpiKind::Mvapich);
        assert_eq!(mv.source_dir_name().unwrap(), "mvapich2-2.3a");

        assert!(find_release("lam-7.1.4").is_none());
    }

    #[test]
    fn test_configure_args_appends_prefix() {
        let conf = configure_args(&args(&["--disable-fortran"]), Path::new("/r/versions/mpi/x"));
        assert_eq!(
            conf.args,
            args(&["--disable-fortran", "--prefix", "/r/versions/mpi/x"])
        );
        assert!(!conf.prefix_dropped);
        assert!(!conf.help_only);
    }

    #[test]
    fn test_configure_args_replaces_user_prefix() {
        let conf = configure_args(
            &args(&["--prefix", "/usr/local", "--enable-cuda"]),
            Path::new("/p"),
        );
        assert_eq!(conf.args, args(&["--enable-cuda", "--prefix", "/p"]));
        assert!(conf.prefix_dropped);
    }

    #[test]
    fn test_configure_args_trailing_prefix() {
        let conf = configure_args(&args(&["--prefix"]), Path::new("/p"));
        assert_eq!(conf.args, args(&["--prefix", "/p"]));
        assert!(conf.prefix_dropped);
    }

    #[test]
    fn test_configure_help_only() {
        let conf = configure_args(&args(&["--enable-cuda", "--help"]), Path::new("/p"));
        assert_eq!(conf.args, args(&["--help"]));
        assert!(conf.help_only);
    }

    #[test]
    fn test_extract_tarball() {
        let tmp = TempDir::new().unwrap();
        let data = tarball(&[
            ("mpich-3.2/configure", b"#!/bin/sh\n"),
            ("mpich-3.2/README", b"hello"),
        ]);

        extract_tarball(&data[..], &tmp.path().join("build")).unwrap();

        let readme = std::fs::read_to_string(tmp.path().join("build/mpich-3.2/README")).unwrap();
        assert_eq!(readme, "hello");
        assert!(tmp.path().join("build/mpich-3.2/configure").is_file());
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let tmp = TempDir::new().unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        // `set_path` refuses `..`, so write the name bytes directly.
        header.as_gnu_mut().unwrap().name[..9].copy_from_slice(b"../evil.t");
        header.set_size(1);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        let data = builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("build");
        assert!(extract_tarball(&data[..], &dest).is_err());
        assert!(!tmp.path().join("evil.t").exists());
    }

    #[cfg(unix)]
    mod installer {
        use super::*;
        use crate::test_support::{shim_context, write_script};
        use crate::util::shell::{ColorChoice, Verbosity};

        /// A tarball whose `configure` writes a Makefile that "installs" a
        /// fake MPICH into the prefix passed to it.
        fn fake_source_tarball() -> Vec<u8> {
            let configure = b"#!/bin/sh\n\
prefix=\"\"\n\
while [ $# -gt 0 ]; do\n\
  if [ \"$1\" = \"--help\" ]; then echo usage; exit 0; fi\n\
  if [ \"$1\" = \"--prefix\" ]; then shift; prefix=\"$1\"; fi\n\
  shift\n\
done\n\
printf 'all:\\n\\ttouch built\\ninstall:\\n\\tmkdir -p %s/bin\\n\\ttouch %s/bin/mpiexec\\n' \"$prefix\" \"$prefix\" > Makefile\n";
            tarball(&[("mpich-3.2/configure", configure)])
        }

        fn installer_fixture(
            tmp: &TempDir,
            configure_opts: Option<&str>,
        ) -> (crate::util::GlobalContext, Shell, InstallOptions) {
            let ctx = shim_context(&tmp.path().join("root"));
            std::fs::write(
                ctx.cache_dir().join("mpich-3.2.tar.gz"),
                fake_source_tarball(),
            )
            .unwrap();
            let shell = Shell::new(Verbosity::Quiet, ColorChoice::Never);
            let opts = InstallOptions {
                mpi: "mpich-3.2".to_string(),
                name: None,
                jobs: Some(1),
                configure_opts: configure_opts.map(str::to_string),
            };
            (ctx, shell, opts)
        }

        fn has_make() -> bool {
            ProcessBuilder::new("make").arg("--version").exec().is_ok()
        }

        #[test]
        fn test_install_from_cached_tarball() {
            if !has_make() {
                return;
            }
            let tmp = TempDir::new().unwrap();
            let (ctx, shell, opts) = installer_fixture(&tmp, None);
            let registry = Registry::load(&ctx).unwrap();

            let installer = Installer::new(&registry, &Config::default(), &shell, &opts).unwrap();
            assert_eq!(installer.name(), "mpich-3.2");
            assert_eq!(installer.prefix(), ctx.entry_path("mpich-3.2"));

            let outcome = installer.run().unwrap();
            assert_eq!(
                outcome,
                InstallOutcome::Installed {
                    name: "mpich-3.2".to_string(),
                    prefix: ctx.entry_path("mpich-3.2"),
                }
            );
            assert!(ctx.entry_path("mpich-3.2").join("bin/mpiexec").exists());
            assert!(installer.source_dir().join("built").exists());
        }

        #[test]
        fn test_existing_source_dir_is_not_clobbered() {
            let tmp = TempDir::new().unwrap();
            let (ctx, shell, opts) = installer_fixture(&tmp, None);
            let registry = Registry::load(&ctx).unwrap();
            let installer = Installer::new(&registry, &Config::default(), &shell, &opts).unwrap();

            write_script(&installer.source_dir().join("configure"), "#!/bin/sh\necho local\n");
            installer.extract().unwrap();

            let configure =
                std::fs::read_to_string(installer.source_dir().join("configure")).unwrap();
            assert!(configure.contains("echo local"));
        }

        #[test]
        fn test_help_only_stops_after_configure() {
            let tmp = TempDir::new().unwrap();
            let (ctx, shell, opts) = installer_fixture(&tmp, Some("--prefix /usr --help"));
            let registry = Registry::load(&ctx).unwrap();
            let installer = Installer::new(&registry, &Config::default(), &shell, &opts).unwrap();

            assert_eq!(installer.run().unwrap(), InstallOutcome::ConfigureHelp);
            assert!(!entry_exists(&ctx.entry_path("mpich-3.2")));
        }

        #[test]
        fn test_taken_name_and_unknown_release() {
            let tmp = TempDir::new().unwrap();
            let (ctx, shell, mut opts) = installer_fixture(&tmp, None);
            std::fs::create_dir_all(ctx.entry_path("mpich-3.2")).unwrap();
            let registry = Registry::load(&ctx).unwrap();

            let err = Installer::new(&registry, &Config::default(), &shell, &opts).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RegistryError>(),
                Some(RegistryError::NameTaken { .. })
            ));

            opts.mpi = "lam-7.1.4".to_string();
            let err = Installer::new(&registry, &Config::default(), &shell, &opts).unwrap_err();
            assert!(err.to_string().contains("unknown MPI"));
        }

        #[test]
        fn test_config_supplies_configure_options_and_jobs() {
            let tmp = TempDir::new().unwrap();
            let (ctx, shell, mut opts) = installer_fixture(&tmp, None);
            opts.jobs = None;
            let registry = Registry::load(&ctx).unwrap();

            let mut config = Config::default();
            config.jobs = Some(3);
            config.mpich.configure_options = vec!["--disable-fortran".to_string()];

            let installer = Installer::new(&registry, &config, &shell, &opts).unwrap();
            assert_eq!(installer.jobs(), 3);
            assert_eq!(installer.user_args, vec!["--disable-fortran".to_string()]);

            opts.configure_opts = Some("--enable-g=all".to_string());
            let installer = Installer::new(&registry, &config, &shell, &opts).unwrap();
            assert_eq!(installer.user_args, vec!["--enable-g=all".to_string()]);
        }
    }
}
