//! 보안 모듈 - 컬럼 암호화, 키 관리
//!
//! 데이터 서비스의 저장 데이터 암호화 기능을 제공합니다.

pub mod crypto;
pub mod key_manager;

pub use crypto::*;
pub use key_manager::*;
