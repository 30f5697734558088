// VHOSTPIN BUILD SCRIPT
// COMPILES src/bpf/main.bpf.c INTO BPF BYTECODE AND GENERATES RUST SKELETON

use std::env;
use std::path::PathBuf;

use libbpf_cargo::SkeletonBuilder;

const BPF_SRC: &str = "src/bpf/main.bpf.c";

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap()).join("bpf.skel.rs");

    // kernel.h ONLY DESCRIBES x86_64 pt_regs
    SkeletonBuilder::new()
        .source(BPF_SRC)
        .clang_args([
            "-I", "src/bpf",
            "-D__TARGET_ARCH_x86",
        ])
        .build_and_generate(&out)
        .unwrap();

    println!("cargo:rerun-if-changed={BPF_SRC}");
    println!("cargo:rerun-if-changed=src/bpf/kernel.h");
    println!("cargo:rerun-if-changed=src/bpf/intf.h");
}
