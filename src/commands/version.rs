//! Command: print version information.

/// Print the installer version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("mod-installer {}", crate::version());
}
