//! Runtime Object Surface
//!
//! Runtime objects are heterogeneous: each module constructs its own
//! concrete types. The core only needs a narrow, uniform surface over them:
//! walking one level down by key, assigning a plain value at a key, and
//! removing a key. Default patch dispatch uses exactly these three
//! operations; everything richer happens inside per-type command handlers,
//! which downcast to the concrete type.
//!
//! `serde_json::Value` implements the trait, so tests and modules whose
//! runtime representation is itself plain data get a structurally parallel
//! target for free.

use std::any::Any;

use serde_json::Value;

/// A live runtime object a config entry compiles into.
pub trait Target: Any {
    /// The concrete object as `Any`, for downcasting in handlers.
    fn as_any(&self) -> &dyn Any;

    /// Mutable access to the concrete object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Walk one level down. Sequence-like objects accept decimal indices.
    /// Returns `None` when the key does not address a nested target.
    fn child_mut(&mut self, key: &str) -> Option<&mut dyn Target>;

    /// Assign a plain value at `key`. Returns `false` when the object has
    /// no such slot (config and object have structurally diverged).
    fn assign(&mut self, key: &str, value: &Value) -> bool;

    /// Remove `key`. Returns `false` when there was nothing to remove.
    fn remove_key(&mut self, key: &str) -> bool;
}

impl dyn Target {
    /// Downcast to a concrete runtime object type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Downcast to a concrete runtime object type, mutably.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Target for Value {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut dyn Target> {
        match self {
            Value::Object(fields) => fields.get_mut(key).map(|child| child as &mut dyn Target),
            Value::Array(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .map(|child| child as &mut dyn Target),
            _ => None,
        }
    }

    fn assign(&mut self, key: &str, value: &Value) -> bool {
        match self {
            Value::Object(fields) => {
                fields.insert(key.to_string(), value.clone());
                true
            }
            Value::Array(items) => {
                let Ok(index) = key.parse::<usize>() else {
                    return false;
                };
                if index < items.len() {
                    items[index] = value.clone();
                    true
                } else if index == items.len() {
                    items.push(value.clone());
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    fn remove_key(&mut self, key: &str) -> bool {
        match self {
            Value::Object(fields) => fields.remove(key).is_some(),
            Value::Array(items) => {
                let Ok(index) = key.parse::<usize>() else {
                    return false;
                };
                if index < items.len() {
                    items.remove(index);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_target_walks_and_assigns() {
        let mut target = json!({ "position": { "x": 0.0 }, "layers": [1, 2] });

        let position = target.child_mut("position").unwrap();
        assert!(position.assign("x", &json!(5.0)));
        assert_eq!(target["position"]["x"], 5.0);

        let layers = target.child_mut("layers").unwrap();
        assert!(layers.assign("1", &json!(9)));
        assert!(layers.assign("2", &json!(10)));
        assert!(!layers.assign("7", &json!(0)));
        assert_eq!(target["layers"], json!([1, 9, 10]));
    }

    #[test]
    fn value_target_removes_keys() {
        let mut target = json!({ "name": "cube", "layers": [1, 2, 3] });

        assert!(target.remove_key("name"));
        assert!(!target.remove_key("name"));

        let layers = target.child_mut("layers").unwrap();
        assert!(layers.remove_key("1"));
        assert_eq!(target["layers"], json!([1, 3]));
    }

    #[test]
    fn missing_children_return_none() {
        let mut target = json!({ "x": 1.0 });
        assert!(target.child_mut("y").is_none());
        // Scalars are not containers.
        assert!(target.child_mut("x").unwrap().child_mut("z").is_none());
    }

    #[test]
    fn downcasting_reaches_the_concrete_type() {
        struct Camera {
            fov: f64,
        }

        impl Target for Camera {
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
            fn child_mut(&mut self, _key: &str) -> Option<&mut dyn Target> {
                None
            }
            fn assign(&mut self, key: &str, value: &Value) -> bool {
                if key == "fov" {
                    if let Some(fov) = value.as_f64() {
                        self.fov = fov;
                        return true;
                    }
                }
                false
            }
            fn remove_key(&mut self, _key: &str) -> bool {
                false
            }
        }

        let mut boxed: Box<dyn Target> = Box::new(Camera { fov: 60.0 });
        boxed.assign("fov", &json!(75.0));
        let camera = (*boxed).downcast_ref::<Camera>().unwrap();
        assert_eq!(camera.fov, 75.0);
    }
}
