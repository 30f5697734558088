include!(concat!(env!("OUT_DIR"), "/bpf.skel.rs"));
