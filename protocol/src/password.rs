//! 登录密码哈希
//!
//! 服务器只接受 base64(md5(明文)) 形式的密码。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use md5::{Digest, Md5};

/// 计算密码哈希
pub fn password_hash(plain: &str) -> String {
    let digest = Md5::digest(plain.as_bytes());
    BASE64.encode(digest)
}

/// 判断字符串是否已经是密码哈希
pub fn is_password_hash(value: &str) -> bool {
    value.len() == 24
        && BASE64
            .decode(value)
            .map(|bytes| bytes.len() == 16)
            .unwrap_or(false)
}

/// 明文则哈希，已是哈希则原样返回
pub fn ensure_password_hash(value: &str) -> String {
    if is_password_hash(value) {
        value.to_string()
    } else {
        password_hash(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_known_value() {
        // md5("password") = 5f4dcc3b5aa765d61d8327deb882cf99
        assert_eq!(password_hash("password"), "X03MO1qnZdYdgyfeuILPmQ==");
    }

    #[test]
    fn test_is_password_hash() {
        assert!(is_password_hash(&password_hash("secret")));
        assert!(!is_password_hash("secret"));
        assert!(!is_password_hash("not base64 but 24 chars!"));
    }

    #[test]
    fn test_ensure_password_hash_idempotent() {
        let once = ensure_password_hash("hunter2");
        assert_eq!(ensure_password_hash(&once), once);
    }
}
