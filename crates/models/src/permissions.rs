//! Roles a login can hold, and the checks built on them.

use bitflags::bitflags;
use failure::Fail;
use newsdesk_error::ApiError;
use serde::{de, ser::{self, SerializeSeq}};
use std::{fmt, str::FromStr};

bitflags! {
    /// Set of roles granted to a login.
    pub struct Roles: u32 {
        /// Create new articles.
        const ARTICLE_CREATE = 1 << 0;
        /// Re-open one's own versions for editing.
        const ARTICLE_EDIT_SELF = 1 << 1;
        /// Re-open versions last revised by somebody else.
        const ARTICLE_EDIT_OTHER = 1 << 2;
        /// Submit and discard drafts locked by other users.
        const ARTICLE_SUBMIT = 1 << 3;
        /// Publish and unpublish versions.
        const ARTICLE_PUBLISH = 1 << 4;
        /// Create, modify, and delete logins.
        const LOGIN_MANAGE = 1 << 20;
    }
}

/// Names of all roles, in the order they are listed to users.
pub static ROLE_NAMES: &[(Roles, &str)] = &[
    (Roles::ARTICLE_CREATE, "article:create"),
    (Roles::ARTICLE_EDIT_SELF, "article:edit-self"),
    (Roles::ARTICLE_EDIT_OTHER, "article:edit-other"),
    (Roles::ARTICLE_SUBMIT, "article:submit"),
    (Roles::ARTICLE_PUBLISH, "article:publish"),
    (Roles::LOGIN_MANAGE, "login:manage"),
];

/// Convert a list of role names into a set of roles.
pub fn names_to_bits<'a, I>(names: I) -> Result<Roles, UnknownRoleError>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .try_fold(Roles::empty(), |bits, name| {
            Roles::by_name(name)
                .map(|role| bits | role)
                .ok_or_else(|| UnknownRoleError(name.to_string()))
        })
}

/// Convert a set of roles into a list of their names.
pub fn bits_to_names(bits: Roles) -> Vec<&'static str> {
    ROLE_NAMES.iter()
        .filter(|(role, _)| bits.contains(*role))
        .map(|(_, name)| *name)
        .collect()
}

impl Roles {
    /// Find a single role by its name.
    pub fn by_name(name: &str) -> Option<Roles> {
        ROLE_NAMES.iter()
            .find(|(_, n)| *n == name)
            .map(|(role, _)| *role)
    }

    /// Verify that at least one of `required` roles is held.
    pub fn require_any(self, required: Roles) -> Result<(), RequireRolesError> {
        if required.is_empty() || self.intersects(required) {
            Ok(())
        } else {
            log::trace!("Missing roles: any of {:?}", required);
            Err(RequireRolesError(required))
        }
    }
}

impl fmt::Display for Roles {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&bits_to_names(*self).join(","))
    }
}

/// Parse a comma-separated list of role names.
impl FromStr for Roles {
    type Err = UnknownRoleError;

    fn from_str(v: &str) -> Result<Self, UnknownRoleError> {
        names_to_bits(v.split(','))
    }
}

#[derive(ApiError, Debug, Fail)]
#[api(code = "role:unknown", status = "BAD_REQUEST")]
#[fail(display = "unknown role: {:?}", _0)]
pub struct UnknownRoleError(pub String);

#[derive(ApiError, Debug, Fail)]
#[api(code = "user:insufficient-roles", status = "FORBIDDEN")]
#[fail(display = "one of the following roles is required: {}", _0)]
pub struct RequireRolesError(pub Roles);

/// A statically known requirement on a caller's roles.
///
/// The requirement is satisfied when the caller holds any of [`bits()`].
pub trait Permission {
    fn bits() -> Roles;
}

macro_rules! permission {
    (
        $(#[$meta:meta])*
        $name:ident = $($value:ident)|+
    ) => {
        $(#[$meta])*
        pub struct $name;

        impl Permission for $name {
            #[inline]
            fn bits() -> Roles {
                $(Roles::$value)|+
            }
        }
    };
}

permission!(
    /// Create new articles.
    CreateArticle = ARTICLE_CREATE
);
permission!(
    /// Re-open a version for editing.
    EditArticle = ARTICLE_EDIT_SELF | ARTICLE_EDIT_OTHER
);
permission!(
    /// Save, submit, and discard one's own drafts.
    WriteDraft = ARTICLE_CREATE | ARTICLE_EDIT_SELF | ARTICLE_EDIT_OTHER
);
permission!(SubmitArticle = ARTICLE_SUBMIT);
permission!(PublishArticle = ARTICLE_PUBLISH);
permission!(ManageLogins = LOGIN_MANAGE);

impl ser::Serialize for Roles {
    fn serialize<S>(&self, ser: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        if !ser.is_human_readable() {
            return ser.serialize_u32(self.bits());
        }

        let names = bits_to_names(*self);
        let mut seq = ser.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> de::Deserialize<'de> for Roles {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        if !de.is_human_readable() {
            de.deserialize_u32(RolesVisitor)
        } else {
            de.deserialize_any(RolesVisitor)
        }
    }
}

struct RolesVisitor;

impl<'de> de::Visitor<'de> for RolesVisitor {
    type Value = Roles;

    fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "a set of roles")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Roles, E>
    where
        E: de::Error,
    {
        if v > u64::from(std::u32::MAX) {
            return Err(E::invalid_type(
                de::Unexpected::Unsigned(v), &"a 32-bit integer"));
        }

        Roles::from_bits(v as u32)
            .ok_or_else(|| E::invalid_value(
                de::Unexpected::Unsigned(v), &"a bit-flag of roles"))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Roles, E>
    where
        E: de::Error,
    {
        if v < 0 {
            return Err(E::invalid_value(
                de::Unexpected::Signed(v), &"a bit-flag of roles"));
        }
        self.visit_u64(v as u64)
    }

    fn visit_str<E>(self, v: &str) -> Result<Roles, E>
    where
        E: de::Error,
    {
        v.parse().map_err(|_| E::invalid_value(
            de::Unexpected::Str(v), &"a list of role names"))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Roles, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut bits = Roles::empty();

        while let Some(name) = seq.next_element::<String>()? {
            bits |= Roles::by_name(&name)
                .ok_or_else(|| de::Error::invalid_value(
                    de::Unexpected::Str(&name), &"a role name"))?;
        }

        Ok(bits)
    }
}
