//! Quake 3 content formats: BSP maps, shader scripts and TGA images.
#![forbid(unsafe_code)]

pub mod bsp_q3;
pub mod shader;
pub mod tga;
