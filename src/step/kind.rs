use std::fmt;

/// Master macro defining the closed set of step/node kinds, their canonical tags,
/// accepted aliases, and whether they carry nested bodies.
macro_rules! define_kinds {
    ( $( ($variant:ident, $tag:literal, $container:literal $(, $alias:literal)* ) ),* $(,)? ) => {
        /// The discriminant shared by graph nodes and steps.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Kind {
            $( $variant, )*
        }

        impl Kind {
            pub const ALL: &'static [Kind] = &[ $( Kind::$variant, )* ];

            /// The canonical tag used in both serialized forms.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Kind::$variant => $tag, )*
                }
            }

            /// Resolves a tag or one of its aliases. Hyphens and case are ignored.
            pub fn from_tag(tag: &str) -> Option<Kind> {
                let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $( $tag $( | $alias )* => Some(Kind::$variant), )*
                    _ => None,
                }
            }

            /// Container kinds own nested statement bodies.
            pub fn is_container(&self) -> bool {
                match self {
                    $( Kind::$variant => $container, )*
                }
            }
        }
    };
}

define_kinds! {
    (Connect, "connect", false),
    (Disconnect, "disconnect", false),
    (Write, "write", false, "scpi_write"),
    (Query, "query", false, "scpi_query"),
    (ForLoop, "for_loop", true, "for", "controls_for"),
    (WhileLoop, "while_loop", true, "while", "controls_whileuntil"),
    (Conditional, "conditional", true, "if", "controls_if"),
    (SetVariable, "set_variable", false, "variable_set", "variables_set"),
    (GetVariable, "get_variable", false, "variable_get", "variables_get"),
    (Wait, "wait", false, "sleep", "wait_seconds"),
    (CustomCode, "custom_code", false, "python_code", "snippet"),
    (Sweep, "sweep", true),
    (Poll, "poll", false, "state_machine", "poll_status"),
    (FileTransfer, "file_transfer", false, "save_screenshot", "read_file"),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the statement slots container kinds expose.
pub mod slots {
    pub const BODY: &str = "DO";
    pub const ELSE: &str = "ELSE";
}

impl Kind {
    /// The statement slots this kind owns, in emission order.
    pub fn slot_names(&self) -> &'static [&'static str] {
        match self {
            Kind::Conditional => &[slots::BODY, slots::ELSE],
            Kind::ForLoop | Kind::WhileLoop | Kind::Sweep => &[slots::BODY],
            _ => &[],
        }
    }
}
