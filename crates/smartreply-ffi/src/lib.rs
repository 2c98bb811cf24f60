//! UniFFI bindings crate for the smartreply library
//!
//! Wraps the smartreply crate for UniFFI library mode binding generation.
//!
//! ## Building for Android
//!
//! 1. Build the library for each ABI (with cargo-ndk):
//!    ```bash
//!    cargo ndk -t arm64-v8a -t x86_64 -o app/src/main/jniLibs build --release -p smartreply-ffi
//!    ```
//!
//! 2. Generate Kotlin bindings:
//!    ```bash
//!    cargo run -p smartreply-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-linux-android/release/libsmartreply_ffi.so \
//!        --language kotlin \
//!        --out-dir generated/kotlin
//!    ```

pub use smartreply::ffi::*;

// Library mode needs the scaffolding symbols in this cdylib
smartreply::uniffi_reexport_scaffolding!();
