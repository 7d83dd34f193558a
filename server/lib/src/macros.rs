/// Build a `BTreeSet` from a list of expressions.
#[macro_export]
macro_rules! btreeset {
    () => (
        std::collections::BTreeSet::new()
    );
    ($($x:expr),+ $(,)?) => ({
        let mut x = std::collections::BTreeSet::new();
        $(
            x.insert($x);
        )*
        x
    });
}

/// Build an [`Entry`](crate::entry::Entry) from a DN and a list of
/// `(attribute, value)` pairs. Panics on an invalid DN, so this is only for
/// tests and fixtures.
#[macro_export]
macro_rules! entry_init {
    ($dn:expr) => ({
        #[allow(clippy::expect_used)]
        let e = $crate::entry::Entry::new(
            $crate::dn::normalize($dn).expect("invalid dn in entry_init!")
        );
        e
    });
    ($dn:expr, $(($attr:expr, $value:expr)),+ $(,)?) => ({
        #[allow(clippy::expect_used)]
        let mut e = $crate::entry::Entry::new(
            $crate::dn::normalize($dn).expect("invalid dn in entry_init!")
        );
        $(
            e.add_ava($attr, $value);
        )*
        e
    });
}

/// Parse a DN literal, panicking if it is invalid. Test and fixture use only.
#[macro_export]
macro_rules! dn {
    ($dn:expr) => {{
        #[allow(clippy::expect_used)]
        let d = $crate::dn::normalize($dn).expect("invalid dn in dn!");
        d
    }};
}
