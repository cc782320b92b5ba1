//! End-to-end compile tests against the real native library.
//!
//! Every test detects the library at runtime and returns early when it is
//! absent, so the suite passes on machines without DXC installed.

use std::sync::Arc;

use glint_dxc::{CompileOptions, Compiler, IncludeResolver, Loader};

const VERTEX_SHADER: &str = r#"
float4 main(float3 position : POSITION) : SV_Position {
    return float4(position, 1.0);
}
"#;

const BROKEN_SHADER: &str = r#"
float4 main() : SV_Position {
    return undeclared_identifier;
}
"#;

const INCLUDING_SHADER: &str = r#"
#include "common.hlsl"

float4 main(float3 position : POSITION) : SV_Position {
    return transform(position);
}
"#;

const INCLUDED_SOURCE: &str = r#"
float4 transform(float3 position) {
    return float4(position * 2.0, 1.0);
}
"#;

/// SPIR-V magic number, little-endian.
const SPIRV_MAGIC: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

fn options() -> CompileOptions {
    CompileOptions::new("main", "vs_6_5", "vulkan1.3")
}

fn compiler() -> Option<Compiler> {
    let loader = Loader::open().ok()?;
    Some(Compiler::new(loader).expect("library opened but instance creation failed"))
}

struct StaticResolver;

impl IncludeResolver for StaticResolver {
    fn resolve_include(&self, path: &str) -> Option<Vec<u8>> {
        path.ends_with("common.hlsl")
            .then(|| INCLUDED_SOURCE.as_bytes().to_vec())
    }
}

struct EmptyResolver;

impl IncludeResolver for EmptyResolver {
    fn resolve_include(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

#[test]
fn minimal_vertex_shader_round_trip() {
    let Some(compiler) = compiler() else { return };

    let result = compiler
        .compile(VERTEX_SHADER, &options(), None)
        .expect("invocation failed");

    assert!(result.is_successful(), "{:?}", result.error_message());
    assert!(result.error_message().is_none());
    let bytecode = result.bytecode();
    assert!(!bytecode.is_empty());
    assert_eq!(bytecode.len() % 4, 0);
    assert_eq!(&bytecode[..4], &SPIRV_MAGIC);
}

#[test]
fn rejected_shader_reports_diagnostics() {
    let Some(compiler) = compiler() else { return };

    let result = compiler
        .compile(BROKEN_SHADER, &options(), None)
        .expect("invocation failed");

    assert!(!result.is_successful());
    assert!(result.bytecode().is_empty());
    let message = result.error_message().expect("diagnostics missing");
    assert!(message.contains("undeclared_identifier"), "{message}");
}

#[test]
fn include_resolution_supplies_source() {
    let Some(compiler) = compiler() else { return };

    let result = compiler
        .compile(INCLUDING_SHADER, &options(), Some(&StaticResolver))
        .expect("invocation failed");

    assert!(result.is_successful(), "{:?}", result.error_message());
    assert!(!result.bytecode().is_empty());
}

#[test]
fn unresolved_include_fails_the_compile() {
    let Some(compiler) = compiler() else { return };

    let result = compiler
        .compile(INCLUDING_SHADER, &options(), Some(&EmptyResolver))
        .expect("invocation failed");

    // The wording is the engine's own; only non-success plus a non-empty
    // message is guaranteed.
    assert!(!result.is_successful());
    assert!(!result.error_message().unwrap().is_empty());
}

#[test]
fn handle_stays_usable_after_rejection() {
    let Some(compiler) = compiler() else { return };

    let rejected = compiler
        .compile(BROKEN_SHADER, &options(), None)
        .expect("invocation failed");
    assert!(!rejected.is_successful());

    let accepted = compiler
        .compile(VERTEX_SHADER, &options(), None)
        .expect("invocation failed");
    assert!(accepted.is_successful());
}

#[test]
fn repeated_compile_cycles_are_stable() {
    let Some(compiler) = compiler() else { return };

    for _ in 0..100 {
        let result = compiler
            .compile(VERTEX_SHADER, &options(), None)
            .expect("invocation failed");
        assert!(result.is_successful());
        drop(result);
    }
}

#[test]
fn parallel_compiles_keep_their_own_results() {
    let Some(loader) = Loader::open().ok() else { return };

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let loader = Arc::clone(&loader);
            std::thread::spawn(move || {
                let compiler = Compiler::new(loader).expect("instance creation failed");
                // Each thread trips on its own unique identifier so a crossed
                // result would be visible in the diagnostics.
                let marker = format!("missing_symbol_{index}");
                let source = format!(
                    "float4 main() : SV_Position {{ return {marker}; }}"
                );
                let result = compiler
                    .compile(&source, &options(), None)
                    .expect("invocation failed");
                assert!(!result.is_successful());
                let message = result.error_message().unwrap().to_string();
                assert!(message.contains(&marker), "{message}");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
