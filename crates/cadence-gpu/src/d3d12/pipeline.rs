//! Root signature and pipeline state for the mesh pass.

use windows::core::s;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::{
    D3D12SerializeRootSignature, ID3D12Device, ID3D12PipelineState, ID3D12RootSignature,
    D3D12_BLEND_DESC, D3D12_COLOR_WRITE_ENABLE_ALL, D3D12_COMPARISON_FUNC_LESS,
    D3D12_CULL_MODE_BACK, D3D12_DEPTH_STENCIL_DESC, D3D12_DEPTH_WRITE_MASK_ALL,
    D3D12_FILL_MODE_SOLID, D3D12_GRAPHICS_PIPELINE_STATE_DESC, D3D12_INPUT_ELEMENT_DESC,
    D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA, D3D12_INPUT_LAYOUT_DESC,
    D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE, D3D12_RASTERIZER_DESC,
    D3D12_RENDER_TARGET_BLEND_DESC, D3D12_ROOT_CONSTANTS, D3D12_ROOT_PARAMETER,
    D3D12_ROOT_PARAMETER_0, D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
    D3D12_ROOT_SIGNATURE_DESC, D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    D3D12_SHADER_BYTECODE, D3D12_SHADER_VISIBILITY_VERTEX, D3D_ROOT_SIGNATURE_VERSION_1,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R32G32B32A32_FLOAT, DXGI_FORMAT_R32G32B32_FLOAT, DXGI_SAMPLE_DESC,
};

use super::resource::DEPTH_FORMAT;
use super::swapchain::COLOR_FORMAT;
use crate::backend::ShaderSet;
use crate::error::{GpuError, Result};
use crate::mesh::Vertex;

/// Root parameter 0: world matrix (16 constants) then view-projection (16).
pub const ROOT_CONSTANTS: u32 = 32;
pub const WORLD_OFFSET: u32 = 0;
pub const VIEW_PROJECTION_OFFSET: u32 = 16;

pub struct MeshPipeline {
    root_signature: ID3D12RootSignature,
    state: ID3D12PipelineState,
}

impl MeshPipeline {
    pub fn new(device: &ID3D12Device, shaders: &ShaderSet) -> Result<Self> {
        let root_signature = create_root_signature(device)?;

        let input_elements = [
            input_element(s!("POSITION"), DXGI_FORMAT_R32G32B32_FLOAT, 0),
            input_element(s!("NORMAL"), DXGI_FORMAT_R32G32B32_FLOAT, Vertex::NORMAL_OFFSET),
            input_element(s!("COLOR"), DXGI_FORMAT_R32G32B32A32_FLOAT, Vertex::COLOR_OFFSET),
        ];

        let mut render_targets = [D3D12_RENDER_TARGET_BLEND_DESC::default(); 8];
        render_targets[0].RenderTargetWriteMask = D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8;

        let mut rtv_formats = [Default::default(); 8];
        rtv_formats[0] = COLOR_FORMAT;

        let desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            // Borrowed without AddRef; the field is ManuallyDrop.
            pRootSignature: unsafe { std::mem::transmute_copy(&root_signature) },
            VS: bytecode(&shaders.vertex),
            PS: bytecode(&shaders.fragment),
            BlendState: D3D12_BLEND_DESC {
                AlphaToCoverageEnable: false.into(),
                IndependentBlendEnable: false.into(),
                RenderTarget: render_targets,
            },
            SampleMask: u32::MAX,
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE_SOLID,
                CullMode: D3D12_CULL_MODE_BACK,
                FrontCounterClockwise: true.into(),
                DepthClipEnable: true.into(),
                ..Default::default()
            },
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: true.into(),
                DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D12_COMPARISON_FUNC_LESS,
                ..Default::default()
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: input_elements.as_ptr(),
                NumElements: input_elements.len() as u32,
            },
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            RTVFormats: rtv_formats,
            DSVFormat: DEPTH_FORMAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            ..Default::default()
        };

        let state = unsafe { device.CreateGraphicsPipelineState(&desc) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        Ok(Self {
            root_signature,
            state,
        })
    }

    pub const fn root_signature(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }

    pub const fn state(&self) -> &ID3D12PipelineState {
        &self.state
    }
}

fn bytecode(code: &[u8]) -> D3D12_SHADER_BYTECODE {
    D3D12_SHADER_BYTECODE {
        pShaderBytecode: code.as_ptr().cast(),
        BytecodeLength: code.len(),
    }
}

fn input_element(
    semantic: windows::core::PCSTR,
    format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT,
    offset: u32,
) -> D3D12_INPUT_ELEMENT_DESC {
    D3D12_INPUT_ELEMENT_DESC {
        SemanticName: semantic,
        SemanticIndex: 0,
        Format: format,
        InputSlot: 0,
        AlignedByteOffset: offset,
        InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
        InstanceDataStepRate: 0,
    }
}

fn create_root_signature(device: &ID3D12Device) -> Result<ID3D12RootSignature> {
    let parameters = [D3D12_ROOT_PARAMETER {
        ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
        Anonymous: D3D12_ROOT_PARAMETER_0 {
            Constants: D3D12_ROOT_CONSTANTS {
                ShaderRegister: 0,
                RegisterSpace: 0,
                Num32BitValues: ROOT_CONSTANTS,
            },
        },
        ShaderVisibility: D3D12_SHADER_VISIBILITY_VERTEX,
    }];
    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: parameters.len() as u32,
        pParameters: parameters.as_ptr(),
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let serialized = unsafe {
        D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, Some(&mut errors))
    };
    if let Err(err) = serialized {
        let detail = errors.map_or_else(|| err.to_string(), |errors| blob_text(&errors));
        return Err(GpuError::PipelineCreation(format!("root signature: {detail}")));
    }
    let blob = blob
        .ok_or_else(|| GpuError::PipelineCreation("root signature blob missing".into()))?;

    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer().cast::<u8>(), blob.GetBufferSize())
    };
    unsafe { device.CreateRootSignature(0, bytes) }
        .map_err(|e| GpuError::PipelineCreation(format!("CreateRootSignature: {e}")))
}

fn blob_text(blob: &ID3DBlob) -> String {
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer().cast::<u8>(), blob.GetBufferSize())
    };
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}
