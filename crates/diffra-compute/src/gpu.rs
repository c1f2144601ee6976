//! GPU compute backend via wgpu.
//!
//! Implements [`ComputeBackend`] using a wgpu compute shader for the
//! transfer-matrix products that dominate repeated forward passes: once the
//! $K^2 \times N^2$ coupling between two fixed planes has been assembled,
//! every field (or batch of fields) crossing that gap is one dense product.
//!
//! # Precision
//!
//! WGSL has no native f64 support, so the product runs in f32 (interleaved
//! re/im pairs). The f64 ↔ f32 conversion happens at the Rust boundary.
//! Transfer-matrix assembly and on-the-fly row sums stay on Rayon in f64.
//!
//! # Matrix caching
//!
//! The transfer-matrix buffer is kept on the device and its allocation is
//! reused while the matrix shape is unchanged; only its contents are
//! rewritten between calls.

use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard};

use bytemuck::{Pod, Zeroable};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::backend::{check_operand, BackendType, ComputeBackend, ComputeError, DeviceInfo, PairFn};

/// Workgroup width declared in `shaders/transfer.wgsl`.
const WORKGROUP_SIZE: u32 = 256;

/// Uniform buffer parameters passed to the WGSL shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ShaderParams {
    rows: u32,
    cols: u32,
    batch: u32,
    _pad: u32,
}

/// Device-resident transfer matrix.
struct CachedTransfer {
    buffer: wgpu::Buffer,
    rows: usize,
    cols: usize,
}

/// GPU compute backend using wgpu.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    device_name: String,
    cached_transfer: Mutex<Option<CachedTransfer>>,
}

impl GpuBackend {
    /// Create a new GPU backend asynchronously.
    ///
    /// Requests a high-performance adapter if available, otherwise falls
    /// back to any available adapter.
    pub async fn new_async() -> Result<Self, ComputeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| ComputeError::Unavailable("No GPU adapter found".into()))?;

        let device_name = adapter.get_info().name.clone();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("diffra-compute"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| ComputeError::DeviceError(format!("Failed to create device: {}", e)))?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("transfer_shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/transfer.wgsl"))),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("transfer_bind_group_layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, false),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("transfer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("transfer_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        log::info!("GPU backend initialised on {}", device_name);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            device_name,
            cached_transfer: Mutex::new(None),
        })
    }

    /// Create a new GPU backend, blocking the current thread.
    pub fn new_blocking() -> Result<Self, ComputeError> {
        pollster::block_on(Self::new_async())
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, Option<CachedTransfer>>, ComputeError> {
        self.cached_transfer
            .lock()
            .map_err(|_| ComputeError::DeviceError("Transfer cache lock poisoned".into()))
    }

    /// Upload `matrix` and multiply it into `batch` packed input vectors.
    ///
    /// The cache lock is held from upload to readback so concurrent callers
    /// cannot swap the matrix mid-product.
    fn product(
        &self,
        matrix: &Array2<Complex64>,
        inputs: &[[f32; 2]],
        batch: usize,
    ) -> Result<Vec<Complex64>, ComputeError> {
        let mut cache = self.lock_cache()?;
        self.upload_transfer(&mut cache, matrix)?;
        let cached = cache
            .as_ref()
            .ok_or_else(|| ComputeError::DeviceError("Transfer matrix not uploaded to GPU".into()))?;
        self.dispatch(cached, inputs, batch)
    }

    /// Upload the transfer matrix, reusing the device allocation if the shape matches.
    fn upload_transfer(
        &self,
        cache: &mut Option<CachedTransfer>,
        matrix: &Array2<Complex64>,
    ) -> Result<(), ComputeError> {
        let (rows, cols) = matrix.dim();
        let data: Vec<[f32; 2]> = matrix.iter().map(to_f32_pair).collect();

        if let Some(cached) = cache.as_ref() {
            if cached.rows == rows && cached.cols == cols {
                self.queue
                    .write_buffer(&cached.buffer, 0, bytemuck::cast_slice(&data));
                return Ok(());
            }
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("transfer_matrix"),
            size: byte_len(rows * cols),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&data));
        log::debug!("Uploaded {}x{} transfer matrix to GPU", rows, cols);

        *cache = Some(CachedTransfer { buffer, rows, cols });
        Ok(())
    }

    /// Run the batched product against the uploaded transfer matrix.
    ///
    /// `inputs` holds `batch` vectors of length `cols` back to back; the
    /// result holds `batch` vectors of length `rows` in the same layout.
    fn dispatch(
        &self,
        cached: &CachedTransfer,
        inputs: &[[f32; 2]],
        batch: usize,
    ) -> Result<Vec<Complex64>, ComputeError> {
        let (rows, cols) = (cached.rows, cached.cols);
        let out_len = rows * batch;

        let input_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fields_in"),
            size: byte_len(cols * batch),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&input_buffer, 0, bytemuck::cast_slice(inputs));

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fields_out"),
            size: byte_len(out_len),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: byte_len(out_len),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params = ShaderParams {
            rows: rows as u32,
            cols: cols as u32,
            batch: batch as u32,
            _pad: 0,
        };
        let params_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: std::mem::size_of::<ShaderParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transfer_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: cached.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("transfer_encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("transfer_pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            // One thread per output row, one workgroup row per batch member.
            cpass.dispatch_workgroups((rows as u32).div_ceil(WORKGROUP_SIZE), batch as u32, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, byte_len(out_len));
        self.queue.submit(std::iter::once(encoder.finish()));

        let staging_slice = staging_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        staging_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below.
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| ComputeError::DeviceError(format!("Map recv failed: {}", e)))?
            .map_err(|e| ComputeError::DeviceError(format!("Buffer map failed: {}", e)))?;

        let mapped = staging_slice.get_mapped_range();
        let result: Vec<Complex64> = bytemuck::cast_slice::<u8, [f32; 2]>(&mapped)[..out_len]
            .iter()
            .map(|pair| Complex64::new(pair[0] as f64, pair[1] as f64))
            .collect();
        drop(mapped);
        staging_buffer.unmap();

        Ok(result)
    }
}

impl ComputeBackend for GpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("GPU ({})", self.device_name),
            backend_type: BackendType::Gpu,
            memory_bytes: None,
            compute_units: None,
        }
    }

    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: PairFn<'_>,
    ) -> Result<Array2<Complex64>, ComputeError> {
        // Kernel evaluation needs f64 phase accuracy (2πr/λ reaches ~1e4 rad
        // for centimetre gaps), so assembly stays on the CPU.
        let data: Vec<Complex64> = (0..rows * cols)
            .into_par_iter()
            .map(|idx| fill_fn(idx / cols, idx % cols))
            .collect();

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }

    fn parallel_row_sum(
        &self,
        rows: usize,
        cols: usize,
        term_fn: PairFn<'_>,
    ) -> Result<Array1<Complex64>, ComputeError> {
        let data: Vec<Complex64> = (0..rows)
            .into_par_iter()
            .map(|i| (0..cols).map(|j| term_fn(i, j)).sum::<Complex64>())
            .collect();
        Ok(Array1::from_vec(data))
    }

    fn matvec(
        &self,
        matrix: &Array2<Complex64>,
        vector: &Array1<Complex64>,
    ) -> Result<Array1<Complex64>, ComputeError> {
        check_operand(matrix, vector.len())?;
        let input: Vec<[f32; 2]> = vector.iter().map(to_f32_pair).collect();
        Ok(Array1::from_vec(self.product(matrix, &input, 1)?))
    }

    fn matmul(
        &self,
        matrix: &Array2<Complex64>,
        columns: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>, ComputeError> {
        check_operand(matrix, columns.nrows())?;
        let batch = columns.ncols();
        if batch == 0 {
            return Ok(Array2::zeros((matrix.nrows(), 0)));
        }
        // Column b of X becomes the b-th contiguous input vector.
        let input: Vec<[f32; 2]> = columns.t().iter().map(to_f32_pair).collect();
        let out = self.product(matrix, &input, batch)?;

        let rows = matrix.nrows();
        Ok(Array2::from_shape_fn((rows, batch), |(i, b)| out[b * rows + i]))
    }
}

fn to_f32_pair(c: &Complex64) -> [f32; 2] {
    [c.re as f32, c.im as f32]
}

fn byte_len(elements: usize) -> u64 {
    (elements * std::mem::size_of::<[f32; 2]>()) as u64
}
