pub mod nifti_io;

pub use nifti_io::{read_nifti, write_label_nifti, write_nifti, write_rgb_nifti};
