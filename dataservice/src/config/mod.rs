//! 환경 설정 모듈

pub mod db;

pub use db::load_env_file;
