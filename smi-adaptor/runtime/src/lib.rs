#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use linkerd_smi_adaptor_core as core;
pub use linkerd_smi_adaptor_k8s_api as k8s;
pub use linkerd_smi_adaptor_k8s_controller as controller;

mod args;

pub use self::args::Args;
