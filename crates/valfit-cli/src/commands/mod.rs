pub mod msm;
pub mod prepare;
