// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. This module reads compiled
// shaders from disk and wraps the resulting shader modules.

use super::device::Device;
use super::error::{RenderError, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Read a whole SPIR-V binary as 32-bit words.
///
/// Fails with `ShaderLoad` when the file cannot be opened, and with
/// `MalformedShader` when its length is not a whole number of words or it
/// does not start with the SPIR-V magic number.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let mut file = File::open(path).map_err(|source| RenderError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let code = ash::util::read_spv(&mut file).map_err(|source| RenderError::MalformedShader {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Loaded {:?} ({} words)", path, code.len());
    Ok(code)
}

/// Shader module, destroyed as soon as the pipeline that used it is built
pub struct ShaderModule {
    pub handle: vk::ShaderModule,
    device: Arc<Device>,
}

impl ShaderModule {
    pub fn new(device: Arc<Device>, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);

        let handle = unsafe { device.handle.create_shader_module(&create_info, None) }
            .map_err(RenderError::ShaderModuleCreation)?;

        Ok(Self { handle, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.handle.destroy_shader_module(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("shadertoy-vk-{}-{}", std::process::id(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let result = load_spirv(Path::new("shaders/definitely-not-here.spv"));
        match result {
            Err(RenderError::ShaderLoad { path, source }) => {
                assert_eq!(path, PathBuf::from("shaders/definitely-not-here.spv"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected ShaderLoad, got {:?}", other),
        }
    }

    #[test]
    fn partial_word_is_rejected() {
        let path = temp_file("partial.spv", &[0x03, 0x02, 0x23, 0x07, 0x00, 0x00]);
        let result = load_spirv(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(RenderError::MalformedShader { .. })));
    }

    #[test]
    fn missing_magic_is_rejected() {
        let path = temp_file("zeros.spv", &[0u8; 8]);
        let result = load_spirv(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(RenderError::MalformedShader { .. })));
    }

    #[test]
    fn empty_file_is_rejected() {
        let path = temp_file("empty.spv", &[]);
        let result = load_spirv(&path);
        std::fs::remove_file(&path).ok();
        match result {
            Err(RenderError::MalformedShader { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected MalformedShader, got {:?}", other),
        }
    }

    #[test]
    fn whole_words_are_read() {
        let magic = 0x0723_0203u32;
        let mut bytes = magic.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let path = temp_file("words.spv", &bytes);
        let code = load_spirv(&path);
        std::fs::remove_file(&path).ok();

        let code = code.unwrap();
        assert_eq!(code.len(), 2);
        assert_eq!(code[0], magic);
    }
}
