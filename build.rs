//! Build script for ferromatvec
//!
//! Without the `mpi` feature there is nothing to build. With it, the script
//! locates an MPI installation, compiles `csrc/ferromatvec.c` against it and
//! emits the link flags.

use std::env;
use std::path::PathBuf;
use std::process::Command;

const SHIM_SOURCES: [&str; 2] = ["csrc/ferromatvec.c", "csrc/ferromatvec.h"];
const PKG_CONFIG_NAMES: [&str; 3] = ["mpich", "ompi", "mpi"];
const FALLBACK_PREFIXES: [&str; 4] = ["/usr", "/usr/local", "/opt/mpich", "/opt/openmpi"];

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_MPI");
    if env::var_os("CARGO_FEATURE_MPI").is_none() {
        return;
    }

    for source in SHIM_SOURCES {
        println!("cargo:rerun-if-changed={source}");
    }
    for var in ["MPI_PKG_CONFIG", "MPICC", "CRAY_MPICH_DIR"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    let Some((origin, mpi)) = locate_mpi() else {
        panic!(
            "ferromatvec: the `mpi` feature needs an MPI installation. Install MPICH or OpenMPI and either:\n\
             - set MPI_PKG_CONFIG to its pkg-config name (e.g. 'mpich')\n\
             - put 'mpicc' on PATH (or set MPICC)\n\
             - set CRAY_MPICH_DIR on Cray systems"
        );
    };
    println!("cargo:warning=ferromatvec: using MPI from {origin}");

    let mut build = cc::Build::new();
    build
        .file(SHIM_SOURCES[0])
        .include("csrc")
        .includes(&mpi.include_paths)
        .warnings(true)
        .extra_warnings(true);
    if env::var("PROFILE").as_deref() == Ok("release") {
        build.opt_level(3);
    }
    build.compile("ferromatvec");

    for path in &mpi.link_paths {
        println!("cargo:rustc-link-search=native={}", path.display());
        // RPATH so the binary loads the same libmpi it was linked against
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", path.display());
    }
    for lib in &mpi.libs {
        println!("cargo:rustc-link-lib={lib}");
    }
}

#[derive(Default)]
struct MpiFlags {
    include_paths: Vec<PathBuf>,
    link_paths: Vec<PathBuf>,
    libs: Vec<String>,
}

impl MpiFlags {
    fn prefix(prefix: &str) -> Self {
        MpiFlags {
            include_paths: vec![PathBuf::from(prefix).join("include")],
            link_paths: vec![PathBuf::from(prefix).join("lib")],
            libs: vec!["mpi".to_string()],
        }
    }
}

/// Try each discovery strategy in order, returning where MPI was found.
fn locate_mpi() -> Option<(String, MpiFlags)> {
    if let Ok(name) = env::var("MPI_PKG_CONFIG") {
        if let Some(flags) = probe_pkg_config(&name) {
            return Some((format!("MPI_PKG_CONFIG={name}"), flags));
        }
    }

    for name in PKG_CONFIG_NAMES {
        if let Some(flags) = probe_pkg_config(name) {
            return Some((format!("pkg-config {name}"), flags));
        }
    }

    let mpicc = env::var("MPICC").unwrap_or_else(|_| "mpicc".to_string());
    if let Some(flags) = probe_wrapper(&mpicc) {
        return Some((format!("{mpicc} -show"), flags));
    }

    if let Ok(dir) = env::var("CRAY_MPICH_DIR") {
        return Some((format!("CRAY_MPICH_DIR={dir}"), MpiFlags::prefix(&dir)));
    }

    FALLBACK_PREFIXES
        .iter()
        .find(|prefix| PathBuf::from(prefix).join("include/mpi.h").exists())
        .map(|prefix| (prefix.to_string(), MpiFlags::prefix(prefix)))
}

fn probe_pkg_config(name: &str) -> Option<MpiFlags> {
    // Link flags are emitted by hand, together with the RPATH
    let lib = pkg_config::Config::new()
        .cargo_metadata(false)
        .probe(name)
        .ok()?;
    Some(MpiFlags {
        include_paths: lib.include_paths,
        link_paths: lib.link_paths,
        libs: lib.libs,
    })
}

fn probe_wrapper(mpicc: &str) -> Option<MpiFlags> {
    let output = Command::new(mpicc).arg("-show").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(parse_wrapper_flags(&String::from_utf8_lossy(&output.stdout)))
}

/// Pull `-I`, `-L` and `-l` flags out of a compiler wrapper command line.
fn parse_wrapper_flags(command_line: &str) -> MpiFlags {
    let mut flags = MpiFlags::default();
    for token in command_line.split_whitespace() {
        if let Some(path) = token.strip_prefix("-I") {
            flags.include_paths.push(PathBuf::from(path));
        } else if let Some(path) = token.strip_prefix("-L") {
            flags.link_paths.push(PathBuf::from(path));
        } else if let Some(lib) = token.strip_prefix("-l") {
            flags.libs.push(lib.to_string());
        }
    }
    if flags.libs.is_empty() {
        flags.libs.push("mpi".to_string());
    }
    flags
}
