use uuid::Uuid;

/// Генерирует новый идентификатор запроса (UUID v4, 36 символов).
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет формат и уникальность идентификаторов.
    #[test]
    fn test_new_request_id_format() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
