fn main() {
    // This is a `#![no_std] #![no_main]` bare-metal binary built against the
    // host triple (no `x86_64-unknown-none` std available in this
    // environment). Suppress the host C runtime's `_start`/init so it
    // doesn't collide with the kernel's own `_start`.
    println!("cargo:rustc-link-arg-bins=-nostartfiles");
    println!("cargo:rustc-link-arg-bins=-static");
}
