// VHOSTPIN DEPENDENCY CHECK
// EVERYTHING THE AGENT NEEDS FROM THE HOST, WITHOUT LOADING ANY BPF

use std::io::Read;
use std::path::Path;

use anyhow::Result;

const KERNEL_FLAGS: [&str; 2] = ["CONFIG_VHOST_NET", "CONFIG_DEBUG_INFO_BTF"];

fn check_path(label: &str, path: &Path) -> bool {
    if path.exists() {
        println!("  {:<24}OK ({})", label, path.display());
        true
    } else {
        println!("  {:<24}MISSING ({})", label, path.display());
        false
    }
}

// =y OR =m BOTH COUNT: vhost_net IS USUALLY A MODULE
fn config_has(config: &str, flag: &str) -> bool {
    config.lines().any(|line| {
        line.strip_prefix(flag)
            .map(|rest| rest == "=y" || rest == "=m")
            .unwrap_or(false)
    })
}

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }

    let mut ok = true;
    for flag in KERNEL_FLAGS {
        if config_has(&config, flag) {
            println!("  {:<24}OK", flag);
        } else {
            println!("  {:<24}NOT SET", flag);
            ok = false;
        }
    }
    ok
}

pub fn run_check(proc_dir: &Path) -> Result<()> {
    println!("VHOSTPIN DEPENDENCY CHECK");
    println!();

    let mut ok = true;

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    println!("HOST:");
    ok &= check_path("kernel BTF", Path::new("/sys/kernel/btf/vmlinux"));
    ok &= check_path("vhost-net device", Path::new("/dev/vhost-net"));
    ok &= check_path("proc directory", proc_dir);

    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        println!("  {:<24}OK", "root");
    } else {
        println!("  {:<24}NO (euid {}) -- BPF AND sched_setaffinity NEED ROOT", "root", euid);
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}
