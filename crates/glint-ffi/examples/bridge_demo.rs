// Walk the full C surface once: open the loader, create a compiler, compile
// a trivial vertex shader, and print what came back.
//
// Run with the DXC shared library on the loader path; without it the demo
// reports the load failure and exits cleanly.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use glint_ffi::{
    glint_compile, glint_compiler_create, glint_compiler_release, glint_loader_close,
    glint_loader_open, glint_result_bytecode, glint_result_error_message,
    glint_result_free, glint_result_is_successful, GlintCompiler, GlintLoader, GlintStatus,
};

const SHADER: &[u8] =
    b"float4 main(float3 p : POSITION) : SV_Position { return float4(p, 1.0); }\0";

fn main() {
    unsafe {
        let mut loader: *mut GlintLoader = ptr::null_mut();
        let status = glint_loader_open(&mut loader);
        if status != GlintStatus::Ok {
            println!("compiler library unavailable ({status:?})");
            return;
        }
        println!("loader open");

        let mut compiler: *mut GlintCompiler = ptr::null_mut();
        let status = glint_compiler_create(loader, &mut compiler);
        if status != GlintStatus::Ok {
            println!("compiler creation failed ({status:?})");
            glint_loader_close(loader);
            return;
        }
        println!("compiler created");

        let result = glint_compile(compiler, SHADER.as_ptr() as *const c_char, None, ptr::null_mut());
        if glint_result_is_successful(result) {
            let mut bytecode: *const u8 = ptr::null();
            let mut len = 0usize;
            glint_result_bytecode(result, &mut bytecode, &mut len);
            println!("compiled: {len} bytes of SPIR-V");
        } else {
            let message = glint_result_error_message(result);
            println!("rejected: {}", CStr::from_ptr(message).to_string_lossy());
        }

        glint_result_free(result);
        glint_compiler_release(compiler);
        glint_loader_close(loader);
        println!("done");
    }
}
