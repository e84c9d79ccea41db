use chrono::Utc;

/// Текущее время в миллисекундах от эпохи (UTC).
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Сколько миллисекунд прошло с момента `since` (epoch millis).
///
/// Для времени из будущего (рассинхрон часов между сервисами) возвращает
/// отрицательное значение. Время из заголовка может быть любым `i64`,
/// поэтому разность насыщается на границах типа.
pub fn elapsed_millis(since: i64) -> i64 {
    now_millis().saturating_sub(since)
}
