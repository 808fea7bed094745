pub mod init_config;
pub mod run;
pub mod species;
pub mod summarize;
pub mod surfaces;
