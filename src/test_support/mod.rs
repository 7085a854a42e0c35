//! Fake MPI installations for unit tests.
//!
//! A [`FakeMpi`] lays out a prefix that looks enough like the real thing
//! for the probe, the activator and the launcher adapter: a shell-script
//! `bin/mpiexec` printing a canned banner, an `ompi_info` for Open MPI,
//! compiler wrappers, a few libraries and headers.
//!
//! When invoked with anything other than `--version`, the fake launcher
//! prints its arguments and `PYTHONPATH`, then exits with
//! `$FAKE_MPIEXEC_STATUS` (default 0).
//!
//! ```rust,ignore
//! let prefix = FakeMpi::mpich("3.2").create(&tmp.path().join("mpich-3.2"));
//! let installation = crate::probe::require(&prefix)?;
//! ```

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::util::GlobalContext;

#[derive(Debug, Clone)]
enum FakeKind {
    OpenMpi { version: String, api: String },
    Mpich { version: String },
    Mvapich { version: String, mpich_version: String },
    Custom { banner: String },
}

/// Builder for a fake MPI prefix.
#[derive(Debug, Clone)]
pub struct FakeMpi {
    kind: FakeKind,
    runtime_only: bool,
}

impl FakeMpi {
    pub fn open_mpi(version: &str, api: &str) -> Self {
        FakeMpi {
            kind: FakeKind::OpenMpi {
                version: version.to_string(),
                api: api.to_string(),
            },
            runtime_only: false,
        }
    }

    pub fn mpich(version: &str) -> Self {
        FakeMpi {
            kind: FakeKind::Mpich {
                version: version.to_string(),
            },
            runtime_only: false,
        }
    }

    pub fn mvapich(version: &str, mpich_version: &str) -> Self {
        FakeMpi {
            kind: FakeKind::Mvapich {
                version: version.to_string(),
                mpich_version: mpich_version.to_string(),
            },
            runtime_only: false,
        }
    }

    /// A launcher printing an arbitrary banner.
    pub fn custom_banner(banner: &str) -> Self {
        FakeMpi {
            kind: FakeKind::Custom {
                banner: banner.to_string(),
            },
            runtime_only: false,
        }
    }

    /// Leave out compiler wrappers and headers.
    pub fn runtime_only(mut self) -> Self {
        self.runtime_only = true;
        self
    }

    /// Lay out the installation at `prefix` and return it.
    pub fn create(&self, prefix: &Path) -> PathBuf {
        for dir in ["bin", "lib", "include"] {
            fs::create_dir_all(prefix.join(dir)).unwrap();
        }

        let banner = match &self.kind {
            FakeKind::OpenMpi { version, .. } => format!(
                "mpiexec (OpenRTE) {}\n\nReport bugs to http://www.open-mpi.org/community/help/\n",
                version
            ),
            FakeKind::Mpich { version } => hydra_banner(version, prefix),
            FakeKind::Mvapich { mpich_version, .. } => hydra_banner(mpich_version, prefix),
            FakeKind::Custom { banner } => banner.clone(),
        };
        write_script(&prefix.join("bin/mpiexec"), &launcher_script(&banner));

        match &self.kind {
            FakeKind::OpenMpi { version, api } => self.open_mpi_files(prefix, version, api),
            FakeKind::Mpich { version } => self.mpich_files(prefix, version, None),
            FakeKind::Mvapich {
                version,
                mpich_version,
            } => self.mpich_files(prefix, mpich_version, Some(version)),
            FakeKind::Custom { .. } => {}
        }

        prefix.to_path_buf()
    }

    fn open_mpi_files(&self, prefix: &Path, version: &str, api: &str) {
        let info = format!(
            "package:Open MPI fake@localhost Distribution\n\
             ompi:version:full:{version}\n\
             mpi-api:version:full:{api}\n\
             path:prefix:{prefix}\n\
             bindings:c:yes\n\
             bindings:cxx:no\n\
             bindings:mpif.h:yes\n\
             mca:opal:base:param:opal_built_with_cuda_support:value:false\n\
             mca:opal:base:param:opal_built_with_cuda_support:source:default\n",
            prefix = prefix.display()
        );
        write_script(
            &prefix.join("bin/ompi_info"),
            &format!("#!/bin/sh\ncat <<'EOF'\n{}EOF\n", info),
        );

        for tool in ["mpirun", "ompi-server", "orterun", "opal_wrapper"] {
            write_script(&prefix.join("bin").join(tool), "#!/bin/sh\nexit 0\n");
        }
        touch(&prefix.join("lib/libmpi.so.20"));
        touch(&prefix.join("lib/libopen-pal.so.20"));
        touch(&prefix.join("lib/libmca_common_sm.so"));
        fs::create_dir_all(prefix.join("lib/openmpi")).unwrap();
        fs::create_dir_all(prefix.join("lib/pkgconfig")).unwrap();

        if !self.runtime_only {
            for tool in ["mpicc", "mpicxx", "mpifort"] {
                write_script(&prefix.join("bin").join(tool), "#!/bin/sh\nexit 0\n");
            }
            touch(&prefix.join("include/mpi.h"));
            touch(&prefix.join("include/mpif.h"));
            fs::create_dir_all(prefix.join("include/openmpi")).unwrap();
        }
    }

    fn mpich_files(&self, prefix: &Path, mpich_version: &str, mvapich_version: Option<&str>) {
        for tool in ["hydra_pmi_proxy", "mpirun", "parkill"] {
            write_script(&prefix.join("bin").join(tool), "#!/bin/sh\nexit 0\n");
        }
        touch(&prefix.join("lib/libmpi.so.12"));
        touch(&prefix.join("lib/libmpl.so.1"));
        touch(&prefix.join("lib/libopa.so.1"));
        touch(&prefix.join("lib/libz.so"));

        if mvapich_version.is_some() {
            fs::create_dir_all(prefix.join("libexec/osu-micro-benchmarks/mpi")).unwrap();
            touch(&prefix.join("lib/libmpich.so"));
        }

        if self.runtime_only {
            return;
        }

        for tool in ["mpicc", "mpicxx", "mpifort"] {
            write_script(&prefix.join("bin").join(tool), "#!/bin/sh\nexit 0\n");
        }

        let mut header = format!(
            "/* mpi.h */\n#define MPICH_NAME 3\n#define MPICH_VERSION \"{}\"\n",
            mpich_version
        );
        if let Some(version) = mvapich_version {
            header.push_str(&format!("#define MVAPICH2_VERSION \"{}\"\n", version));
        }
        fs::write(prefix.join("include/mpi.h"), header).unwrap();
        touch(&prefix.join("include/mpio.h"));
        touch(&prefix.join("include/opa_primitives.h"));
        fs::create_dir_all(prefix.join("include/primitives")).unwrap();
    }
}

fn hydra_banner(version: &str, prefix: &Path) -> String {
    format!(
        "HYDRA build details:\n\
         \x20   Version:                                 {version}\n\
         \x20   Release Date:                            Wed Nov 11 22:06:48 CST 2015\n\
         \x20   CC:                              gcc\n\
         \x20   Configure options:                       '--disable-option-checking' '--prefix={prefix}' '--disable-cuda'\n\
         \x20   Process Manager:                         pmi\n",
        prefix = prefix.display()
    )
}

fn launcher_script(banner: &str) -> String {
    format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then\n\
         cat <<'EOF'\n{banner}\nEOF\n\
         exit 0\n\
         fi\n\
         echo \"mpiexec $*\"\n\
         echo \"PYTHONPATH=$PYTHONPATH\"\n\
         exit ${{FAKE_MPIEXEC_STATUS:-0}}\n"
    )
}

/// Write an executable shell script.
pub fn write_script(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn touch(path: &Path) {
    fs::write(path, "").unwrap();
}

/// A `python` stand-in for `python -m pip install ... --target DIR mpi4py`.
///
/// It creates `DIR/mpi4py` and records `$MPICC` in `DIR/mpi4py/MPICC`.
pub fn fake_python(dir: &Path) -> PathBuf {
    let python = dir.join("python3");
    write_script(
        &python,
        "#!/bin/sh\n\
         target=\"\"\n\
         while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"--target\" ]; then shift; target=\"$1\"; fi\n\
         \x20 shift\n\
         done\n\
         [ -n \"$target\" ] || exit 2\n\
         mkdir -p \"$target/mpi4py\"\n\
         echo \"$MPICC\" > \"$target/mpi4py/MPICC\"\n",
    );
    python.canonicalize().unwrap()
}

/// Context rooted at `root` whose search path is the shim `bin` directory.
///
/// Activating an entry through this context makes it the active one.
pub fn shim_context(root: &Path) -> GlobalContext {
    let ctx = GlobalContext::with_root(root);
    let path = ctx.shims_dir().join("bin");
    let ctx = ctx.with_search_path(path.into_os_string());
    ctx.ensure_dirs().unwrap();
    ctx
}
