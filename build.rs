// Build script: GLSL -> SPIR-V through glslc
//
// Without glslc the build keeps going only if the .spv files from an
// earlier build are still there; otherwise startup would fail on a
// missing shader.

use std::path::Path;
use std::process::Command;

const SHADERS: [(&str, &str); 2] = [
    ("shaders/triangle.vert", "shaders/triangle.vert.spv"),
    ("shaders/triangle.frag", "shaders/triangle.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for (source, output) in SHADERS {
        compile_shader(Path::new(source), Path::new(output));
    }
}

fn compile_shader(source: &Path, output: &Path) {
    match Command::new("glslc").arg(source).arg("-o").arg(output).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!(
                "glslc failed on {}: exit code {:?}",
                source.display(),
                status.code()
            );
        }
        Err(e) if output.exists() => {
            println!(
                "cargo:warning=glslc unavailable ({}), using existing {}",
                e,
                output.display()
            );
        }
        Err(e) => {
            panic!(
                "glslc unavailable ({}) and {} does not exist. Install the Vulkan SDK \
                 or run: glslc {} -o {}",
                e,
                output.display(),
                source.display(),
                output.display()
            );
        }
    }
}
