//! Open MPI: `ompi_info --all --parsable`.
//!
//! Every line of the parsable dump is `field:field:...:value`. The last
//! field is the value and everything before it is the key:
//!
//! ```text
//! ompi:version:full:2.1.1
//! bindings:cxx:no
//! mca:opal:base:param:opal_built_with_cuda_support:value:false
//! ```
//!
//! MCA parameter lines carry an attribute name (`value`, `source`, `status`,
//! ...) before the value; the `value` attribute is additionally stored under
//! the parameter's own key so it can be looked up without the suffix.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};

use super::ProbeError;
use crate::core::{Binding, Flavor};
use crate::util::process::ProcessBuilder;

const VERSION_KEY: &str = "ompi:version:full";
const MPI_API_KEY: &str = "mpi-api:version:full";
const CUDA_KEY: &str = "mca:opal:base:param:opal_built_with_cuda_support";

/// Parsed `ompi_info` dump.
#[derive(Debug, Clone, Default)]
pub struct OmpiInfo {
    values: HashMap<String, String>,
}

impl OmpiInfo {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn is_yes(&self, key: &str) -> bool {
        matches!(self.get(key), Some("yes"))
    }

    /// Bindings reported under the `bindings:` section.
    pub fn bindings(&self) -> BTreeSet<Binding> {
        let mut bindings = BTreeSet::new();
        if self.is_yes("bindings:c") {
            bindings.insert(Binding::C);
        }
        if self.is_yes("bindings:cxx") {
            bindings.insert(Binding::Cxx);
        }
        if self.is_yes("bindings:mpif.h")
            || self.is_yes("bindings:use_mpi")
            || self.is_yes("bindings:use_mpi_f08")
        {
            bindings.insert(Binding::Fortran);
        }
        bindings
    }

    /// CUDA support, if the build reports it.
    pub fn cuda(&self) -> Option<bool> {
        match self.get(CUDA_KEY)? {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }
}

/// Parse the output of `ompi_info --all --parsable`. Later lines win.
pub fn parse_ompi_info(text: &str) -> OmpiInfo {
    let mut values = HashMap::new();

    for line in text.lines() {
        let line = line.trim_end();
        let Some((key, value)) = line.rsplit_once(':') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }

        if key.starts_with("mca:") {
            if let Some(param) = key.strip_suffix(":value") {
                values.insert(param.to_string(), value.to_string());
            }
        }
        values.insert(key.to_string(), value.to_string());
    }

    OmpiInfo { values }
}

/// Run `ompi_info` under `prefix` and build the Open MPI record.
pub fn probe(prefix: &Path) -> Result<Flavor> {
    let tool = prefix.join("bin").join("ompi_info");
    let output = ProcessBuilder::new(&tool)
        .args(["--all", "--parsable"])
        .exec()
        .with_context(|| format!("failed to query Open MPI at {}", prefix.display()))?;
    let text = String::from_utf8_lossy(&output.stdout);

    flavor_from_info(&tool, &parse_ompi_info(&text))
}

fn flavor_from_info(tool: &Path, info: &OmpiInfo) -> Result<Flavor> {
    let version = info.get(VERSION_KEY).ok_or_else(|| ProbeError::MissingField {
        tool: tool.to_path_buf(),
        field: VERSION_KEY,
    })?;

    Ok(Flavor::OpenMpi {
        version: version.to_string(),
        mpi_version: info.get(MPI_API_KEY).map(str::to_string),
        bindings: info.bindings(),
        cuda: info.cuda(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
package:Open MPI builder@host Distribution
ompi:version:full:2.1.1
ompi:version:repo:v2.1.0-100-ga2fdb5b
mpi-api:version:full:3.1
path:prefix:/opt/openmpi-2.1.1
bindings:c:yes
bindings:cxx:no
bindings:mpif.h:yes
mca:opal:base:param:opal_built_with_cuda_support:value:false
mca:opal:base:param:opal_built_with_cuda_support:source:default
mca:opal:base:param:opal_built_with_cuda_support:status:read-only
";

    #[test]
    fn test_parse_last_field_is_value() {
        let info = parse_ompi_info(SAMPLE);
        assert_eq!(info.get("ompi:version:full"), Some("2.1.1"));
        assert_eq!(info.get("mpi-api:version:full"), Some("3.1"));
        assert_eq!(info.get("ompi:version:repo"), Some("v2.1.0-100-ga2fdb5b"));
        assert_eq!(info.get("path:prefix"), Some("/opt/openmpi-2.1.1"));
    }

    #[test]
    fn test_mca_value_attribute() {
        let info = parse_ompi_info(SAMPLE);
        assert_eq!(info.get(CUDA_KEY), Some("false"));
        assert_eq!(info.get(&format!("{}:status", CUDA_KEY)), Some("read-only"));
        assert_eq!(info.cuda(), Some(false));
    }

    #[test]
    fn test_last_write_wins() {
        let info = parse_ompi_info("ompi:version:full:1.10.7\nompi:version:full:2.0.3\n");
        assert_eq!(info.get(VERSION_KEY), Some("2.0.3"));
        assert_eq!(info.len(), 1);
    }

    #[test]
    fn test_lines_without_key_are_ignored() {
        let info = parse_ompi_info("garbage\n:orphan\n\n");
        assert!(info.is_empty());
    }

    #[test]
    fn test_bindings() {
        let info = parse_ompi_info(SAMPLE);
        let bindings = info.bindings();
        assert!(bindings.contains(&Binding::C));
        assert!(!bindings.contains(&Binding::Cxx));
        assert!(bindings.contains(&Binding::Fortran));
    }

    #[test]
    fn test_flavor_requires_version() {
        let info = parse_ompi_info("mpi-api:version:full:3.1\n");
        let err = flavor_from_info(Path::new("/opt/ompi/bin/ompi_info"), &info).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::MissingField { field: VERSION_KEY, .. })
        ));
    }

    #[test]
    fn test_flavor_from_sample() {
        let info = parse_ompi_info(SAMPLE);
        let flavor = flavor_from_info(Path::new("ompi_info"), &info).unwrap();
        assert_eq!(
            flavor,
            Flavor::OpenMpi {
                version: "2.1.1".to_string(),
                mpi_version: Some("3.1".to_string()),
                bindings: [Binding::C, Binding::Fortran].into_iter().collect(),
                cuda: Some(false),
            }
        );
    }
}
