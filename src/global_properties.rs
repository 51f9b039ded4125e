//! Global properties are immutable, typed values shared by every module of a simulation, most
//! importantly the run's [`Parameters`](crate::parameters::Parameters).
//!
//! A property is declared with [`define_global_property!`], which names its value type and an
//! optional validator. Values are set once with
//! [`ContextGlobalPropertiesExt::set_global_property_value`] or loaded from a JSON file with
//! [`ContextGlobalPropertiesExt::load_global_property`]; setting a property twice is an error.
use std::any::{Any, TypeId};
use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::EpiError;
use crate::{HashMap, HashMapExt};

/// Defines a global property with a value type and an optional validation function.
///
/// ```ignore
/// define_global_property!(Population, u64);
/// define_global_property!(Parameters, Params, |p: &Params| p.validate());
/// ```
#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty, $validate:expr) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($global_property)
            }

            fn validate(value: &$value) -> Result<(), $crate::error::EpiError> {
                $validate(value)
            }
        }
    };
    ($global_property:ident, $value:ty) => {
        $crate::define_global_property!($global_property, $value, |_: &$value| Ok(()));
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;

    fn name() -> &'static str;

    /// Checks a value before it is stored.
    fn validate(value: &Self::Value) -> Result<(), EpiError>;
}

/// Reads a JSON file and deserializes it into `T`.
pub fn load_parameters_from_json<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> Result<T, EpiError> {
    let path = path.as_ref();
    trace!("loading parameters from {}", path.display());
    let contents = fs::read_to_string(path)?;
    let value = serde_json::from_str(&contents)?;
    Ok(value)
}

struct GlobalPropertiesDataContainer {
    values: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer {
        values: HashMap::new(),
    }
);

pub trait ContextGlobalPropertiesExt {
    /// Validates and stores the value of a global property. A property may only be set once.
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        property: T,
        value: T::Value,
    ) -> Result<(), EpiError>;

    /// The value of a global property, or `None` if it was never set.
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;

    /// Loads a property from a JSON file, then validates and stores it.
    fn load_global_property<T: GlobalProperty, P: AsRef<Path>>(
        &mut self,
        property: T,
        path: P,
    ) -> Result<(), EpiError>
    where
        T::Value: DeserializeOwned;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        _property: T,
        value: T::Value,
    ) -> Result<(), EpiError> {
        T::validate(&value)?;
        let container = self.get_data_mut(GlobalPropertiesPlugin);
        if container.values.contains_key(&TypeId::of::<T>()) {
            return Err(EpiError::EpiError(format!(
                "global property `{}` is already set",
                T::name()
            )));
        }
        trace!("setting global property `{}`", T::name());
        container.values.insert(TypeId::of::<T>(), Box::new(value));
        Ok(())
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data(GlobalPropertiesPlugin)?
            .values
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T::Value>()
    }

    fn load_global_property<T: GlobalProperty, P: AsRef<Path>>(
        &mut self,
        property: T,
        path: P,
    ) -> Result<(), EpiError>
    where
        T::Value: DeserializeOwned,
    {
        let value: T::Value = load_parameters_from_json(path)?;
        self.set_global_property_value(property, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Deserialize, PartialEq)]
    pub struct Rates {
        pub contact_rate: f64,
        pub label: String,
    }

    define_global_property!(Rate, f64);
    define_global_property!(PositiveRate, f64, |v: &f64| {
        if *v > 0.0 {
            Ok(())
        } else {
            Err(EpiError::invalid_fields(&["rate"]))
        }
    });
    define_global_property!(RatesProperty, Rates);

    #[test]
    fn set_and_get() {
        let mut context = Context::new();
        assert!(context.get_global_property_value(Rate).is_none());
        context.set_global_property_value(Rate, 0.5).unwrap();
        assert_eq!(context.get_global_property_value(Rate), Some(&0.5));
    }

    #[test]
    fn setting_twice_fails() {
        let mut context = Context::new();
        context.set_global_property_value(Rate, 0.5).unwrap();
        assert!(context.set_global_property_value(Rate, 0.7).is_err());
        assert_eq!(context.get_global_property_value(Rate), Some(&0.5));
    }

    #[test]
    fn validator_rejects_value() {
        let mut context = Context::new();
        let error = context
            .set_global_property_value(PositiveRate, -1.0)
            .unwrap_err();
        assert!(matches!(error, EpiError::InvalidFieldError(Some(_))));
        assert!(context.get_global_property_value(PositiveRate).is_none());
    }

    #[test]
    fn load_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"contact_rate": 2.5, "label": "baseline"}}"#).unwrap();

        let mut context = Context::new();
        context.load_global_property(RatesProperty, file.path()).unwrap();
        assert_eq!(
            context.get_global_property_value(RatesProperty),
            Some(&Rates {
                contact_rate: 2.5,
                label: "baseline".to_string()
            })
        );
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let error = load_parameters_from_json::<Rates, _>(file.path()).unwrap_err();
        assert!(matches!(error, EpiError::JsonError(_)));
    }
}
