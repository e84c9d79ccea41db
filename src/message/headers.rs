use std::collections::HashMap;

/// Заголовки сообщения: ключ → упорядоченный список значений.
///
/// Ключи чувствительны к регистру. Запись по уже существующему ключу через
/// [`Headers::insert`] заменяет все прежние значения.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Устанавливает единственное значение ключа.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// Добавляет значение в конец списка значений ключа.
    pub fn append(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Заменяет весь список значений ключа.
    pub fn set_all(
        &mut self,
        key: impl Into<String>,
        values: Vec<String>,
    ) {
        self.inner.insert(key.into(), values);
    }

    /// Первое значение ключа.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Все значения ключа в порядке добавления.
    pub fn get_all(
        &self,
        key: &str,
    ) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Переносит все ключи из `other`; совпадающие ключи перезаписываются.
    pub fn merge(
        &mut self,
        other: Headers,
    ) {
        self.inner.extend(other.inner);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, Vec<String>>> for Headers {
    fn from(inner: HashMap<String, Vec<String>>) -> Self {
        Self { inner }
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}
