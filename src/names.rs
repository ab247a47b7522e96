use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name == "<init>" || name == "<clinit>" {
            return Ok(());
        }
        if name.contains(&['.', ';', '[', '/', '<', '>'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    pub const INIT: UnqualifiedName = UnqualifiedName(Cow::Borrowed("<init>"));
    pub const CLINIT: UnqualifiedName = UnqualifiedName(Cow::Borrowed("<clinit>"));

    pub const fn from_static(name: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(name))
    }
}

impl BinaryName {
    pub const OBJECT: BinaryName = BinaryName(Cow::Borrowed("java/lang/Object"));
    pub const STRING: BinaryName = BinaryName(Cow::Borrowed("java/lang/String"));
    pub const STRINGBUILDER: BinaryName = BinaryName(Cow::Borrowed("java/lang/StringBuilder"));
    pub const THROWABLE: BinaryName = BinaryName(Cow::Borrowed("java/lang/Throwable"));

    pub const fn from_static(name: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(name))
    }

    /// Name of a member class nested inside this one (`Outer` + `Inner` is `Outer$Inner`)
    pub fn nested(&self, simple_name: &str) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}${}", self.as_str(), simple_name)))
    }

    /// Segment after the last `/`, or the whole name if there is no package
    pub fn simple_name(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[idx + 1..],
            None => self.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(UnqualifiedName::from_string("value".to_string()).is_ok());
        assert!(UnqualifiedName::from_string("<init>".to_string()).is_ok());
        assert!(UnqualifiedName::from_string("a.b".to_string()).is_err());
        assert!(UnqualifiedName::from_string("".to_string()).is_err());
        assert!(BinaryName::from_string("java/lang/Object".to_string()).is_ok());
        assert!(BinaryName::from_string("java//Object".to_string()).is_err());
        assert!(BinaryName::from_string("bad;name".to_string()).is_err());
    }

    #[test]
    fn nested_names() {
        let outer = BinaryName::from_string("com/example/Outer".to_string()).unwrap();
        assert_eq!(outer.nested("Inner").as_str(), "com/example/Outer$Inner");
        assert_eq!(outer.nested("1").as_str(), "com/example/Outer$1");
        assert_eq!(outer.simple_name(), "Outer");
        assert_eq!(outer.nested("Inner").simple_name(), "Outer$Inner");
    }
}
