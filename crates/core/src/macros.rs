// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.

/// Bind enum variants to their stable string tags.
///
/// mapd's status and flavor enums each have one lowercase tag that appears
/// on the wire, in store columns, and in log lines. This generates the
/// `as_str()` accessor for that tag plus a `Display` impl delegating to it,
/// so the mapping lives in exactly one place per enum.
///
/// ```ignore
/// mapd_core::string_enum! {
///     SlotStatus {
///         Idle => "idle",
///         Busy => "busy",
///     }
/// }
/// ```
#[macro_export]
macro_rules! string_enum {
    ($enum:ty { $( $variant:ident => $tag:expr ),+ $(,)? }) => {
        impl $enum {
            /// Stable lowercase tag for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $tag, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
