use std::str::FromStr;

use super::error::{Error, TypeError};

/// Raw `key=value` pairs of a query string. Keys may repeat.
pub type FormData = Vec<(String, String)>;

pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_str(&self, key: &str) -> Result<String, TypeError> {
        match self.first(key) {
            Some(value) => Ok(value.to_string()),
            None => Err(TypeError::new("Invalid key")),
        }
    }

    pub fn get_optional_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.first(key) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_e| Error::Validation(format!("Invalid number for `{key}`"))),
            None => Ok(None),
        }
    }

    /// Every value given for `key`, in query order.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    /// `1`/`true` and `0`/`false`; a missing key is false.
    pub fn get_flag(&self, key: &str) -> Result<bool, Error> {
        match self.first(key) {
            None => Ok(false),
            Some("1") | Some("true") => Ok(true),
            Some("0") | Some("false") => Ok(false),
            Some(_) => Err(Error::Validation(format!("Invalid flag for `{key}`"))),
        }
    }
}
