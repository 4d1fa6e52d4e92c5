//! [`serde_with`] helpers.

use std::marker::PhantomData;

use serde::de::Deserializer;
use serde_with::de::DeserializeAs;
use serde_with::SerializeAs;

/// `serde_with` adapter letting [`web_time::SystemTime`] use the `std` based `serde_with`
/// timestamp formats, e.g. `WebSystemTime<TimestampMilliSeconds<i64>>`.
pub struct WebSystemTime<T>(PhantomData<T>);
impl<'de, T> DeserializeAs<'de, web_time::SystemTime> for WebSystemTime<T>
where
    T: DeserializeAs<'de, std::time::SystemTime>,
{
    fn deserialize_as<D>(deserializer: D) -> Result<web_time::SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize_as(deserializer).map(from_std)
    }
}
impl<T> SerializeAs<web_time::SystemTime> for WebSystemTime<T>
where
    T: SerializeAs<std::time::SystemTime>,
{
    fn serialize_as<S>(source: &web_time::SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        T::serialize_as(&to_std(*source), serializer)
    }
}

#[cfg(all(target_family = "wasm", target_os = "unknown"))]
fn from_std(time: std::time::SystemTime) -> web_time::SystemTime {
    <web_time::SystemTime as web_time::web::SystemTimeExt>::from_std(time)
}
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
fn to_std(time: web_time::SystemTime) -> std::time::SystemTime {
    <web_time::SystemTime as web_time::web::SystemTimeExt>::to_std(time)
}

// Off the web, `web_time` re-exports `std::time`.
#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
fn from_std(time: std::time::SystemTime) -> web_time::SystemTime {
    time
}
#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
fn to_std(time: web_time::SystemTime) -> std::time::SystemTime {
    time
}
