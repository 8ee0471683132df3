// build.rs
// Compiles the GLSL sources under resources/shaders to SPIR-V

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };

    if !Path::new(&glslc).exists() {
        eprintln!("error: glslc not found at: {glslc}");
        panic!("Shader compiler not found");
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {e}");
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {shader_dir:?}");
            return;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext));
        if !is_shader {
            continue;
        }

        // triangle.vert -> triangle.vert.spv, so stages never collide
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let out_file = target_dir.join(format!("{file_name}.spv"));

        if is_up_to_date(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => compiled += 1,
            Ok(s) => {
                eprintln!("error: glslc failed for {path:?} with exit code: {}", s.code().unwrap_or(-1));
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {path:?}: {e}");
                panic!("Failed to execute shader compiler");
            }
        }
    }

    eprintln!("info: Compiled {compiled} shader(s) into {target_dir:?}");
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src_time), Ok(dst_time)) => dst_time >= src_time,
            _ => false,
        },
        _ => false,
    }
}
