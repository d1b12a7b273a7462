//! Built-in XML Schema datatypes
//!
//! Lexical checks use regexes compiled once into `OnceLock` statics. Value
//! comparison is implemented for the decimal and floating-point families;
//! date/time values compare lexically, which is exact for values written
//! in the same timezone form.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::xml::WhiteSpace;

/// Body of a character class matching an XML `NameStartChar`
const NAME_START_CLASS: &str = r":A-Z_a-z\x{C0}-\x{D6}\x{D8}-\x{F6}\x{F8}-\x{2FF}\x{370}-\x{37D}\x{37F}-\x{1FFF}\x{200C}-\x{200D}\x{2070}-\x{218F}\x{2C00}-\x{2FEF}\x{3001}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFFD}\x{10000}-\x{EFFFF}";

/// Body of a character class matching an XML `NameChar` (minus the start set)
const NAME_EXTRA_CLASS: &str = r"\-.0-9\x{B7}\x{300}-\x{36F}\x{203F}-\x{2040}";

/// A primitive or derived datatype built into XML Schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    NmToken,
    Id,
    IdRef,
    Entity,
    AnyUri,
    QName,
    Notation,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Duration,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    HexBinary,
    Base64Binary,
}

/// How values of a datatype are ordered for range facets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Decimal,
    Float,
    Temporal,
    Unordered,
}

impl Builtin {
    pub const ALL: [Builtin; 42] = [
        Builtin::AnySimpleType,
        Builtin::String,
        Builtin::NormalizedString,
        Builtin::Token,
        Builtin::Language,
        Builtin::Name,
        Builtin::NCName,
        Builtin::NmToken,
        Builtin::Id,
        Builtin::IdRef,
        Builtin::Entity,
        Builtin::AnyUri,
        Builtin::QName,
        Builtin::Notation,
        Builtin::Boolean,
        Builtin::Decimal,
        Builtin::Integer,
        Builtin::NonPositiveInteger,
        Builtin::NegativeInteger,
        Builtin::NonNegativeInteger,
        Builtin::PositiveInteger,
        Builtin::Long,
        Builtin::Int,
        Builtin::Short,
        Builtin::Byte,
        Builtin::UnsignedLong,
        Builtin::UnsignedInt,
        Builtin::UnsignedShort,
        Builtin::UnsignedByte,
        Builtin::Float,
        Builtin::Double,
        Builtin::Duration,
        Builtin::DateTime,
        Builtin::Date,
        Builtin::Time,
        Builtin::GYear,
        Builtin::GYearMonth,
        Builtin::GMonth,
        Builtin::GMonthDay,
        Builtin::GDay,
        Builtin::HexBinary,
        Builtin::Base64Binary,
    ];

    /// Local name in the XSD namespace
    pub fn name(self) -> &'static str {
        match self {
            Builtin::AnySimpleType => "anySimpleType",
            Builtin::String => "string",
            Builtin::NormalizedString => "normalizedString",
            Builtin::Token => "token",
            Builtin::Language => "language",
            Builtin::Name => "Name",
            Builtin::NCName => "NCName",
            Builtin::NmToken => "NMTOKEN",
            Builtin::Id => "ID",
            Builtin::IdRef => "IDREF",
            Builtin::Entity => "ENTITY",
            Builtin::AnyUri => "anyURI",
            Builtin::QName => "QName",
            Builtin::Notation => "NOTATION",
            Builtin::Boolean => "boolean",
            Builtin::Decimal => "decimal",
            Builtin::Integer => "integer",
            Builtin::NonPositiveInteger => "nonPositiveInteger",
            Builtin::NegativeInteger => "negativeInteger",
            Builtin::NonNegativeInteger => "nonNegativeInteger",
            Builtin::PositiveInteger => "positiveInteger",
            Builtin::Long => "long",
            Builtin::Int => "int",
            Builtin::Short => "short",
            Builtin::Byte => "byte",
            Builtin::UnsignedLong => "unsignedLong",
            Builtin::UnsignedInt => "unsignedInt",
            Builtin::UnsignedShort => "unsignedShort",
            Builtin::UnsignedByte => "unsignedByte",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::Duration => "duration",
            Builtin::DateTime => "dateTime",
            Builtin::Date => "date",
            Builtin::Time => "time",
            Builtin::GYear => "gYear",
            Builtin::GYearMonth => "gYearMonth",
            Builtin::GMonth => "gMonth",
            Builtin::GMonthDay => "gMonthDay",
            Builtin::GDay => "gDay",
            Builtin::HexBinary => "hexBinary",
            Builtin::Base64Binary => "base64Binary",
        }
    }

    pub fn whitespace(self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    pub fn order(self) -> OrderKind {
        match self {
            Builtin::Decimal
            | Builtin::Integer
            | Builtin::NonPositiveInteger
            | Builtin::NegativeInteger
            | Builtin::NonNegativeInteger
            | Builtin::PositiveInteger
            | Builtin::Long
            | Builtin::Int
            | Builtin::Short
            | Builtin::Byte
            | Builtin::UnsignedLong
            | Builtin::UnsignedInt
            | Builtin::UnsignedShort
            | Builtin::UnsignedByte => OrderKind::Decimal,
            Builtin::Float | Builtin::Double => OrderKind::Float,
            Builtin::Duration
            | Builtin::DateTime
            | Builtin::Date
            | Builtin::Time
            | Builtin::GYear
            | Builtin::GYearMonth
            | Builtin::GMonth
            | Builtin::GMonthDay
            | Builtin::GDay => OrderKind::Temporal,
            _ => OrderKind::Unordered,
        }
    }

    /// Inclusive value bounds of the integer family
    fn integer_bounds(self) -> Option<(Option<&'static str>, Option<&'static str>)> {
        let bounds = match self {
            Builtin::Integer => (None, None),
            Builtin::NonPositiveInteger => (None, Some("0")),
            Builtin::NegativeInteger => (None, Some("-1")),
            Builtin::NonNegativeInteger => (Some("0"), None),
            Builtin::PositiveInteger => (Some("1"), None),
            Builtin::Long => (
                Some("-9223372036854775808"),
                Some("9223372036854775807"),
            ),
            Builtin::Int => (Some("-2147483648"), Some("2147483647")),
            Builtin::Short => (Some("-32768"), Some("32767")),
            Builtin::Byte => (Some("-128"), Some("127")),
            Builtin::UnsignedLong => (Some("0"), Some("18446744073709551615")),
            Builtin::UnsignedInt => (Some("0"), Some("4294967295")),
            Builtin::UnsignedShort => (Some("0"), Some("65535")),
            Builtin::UnsignedByte => (Some("0"), Some("255")),
            _ => return None,
        };
        Some(bounds)
    }

    /// Check a whitespace-normalized literal against the lexical space
    pub fn check(self, value: &str) -> Result<(), String> {
        let valid = match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::AnyUri => true,
            Builtin::NormalizedString => !value.contains(['\t', '\n', '\r']),
            Builtin::Token => {
                !value.contains(['\t', '\n', '\r'])
                    && !value.starts_with(' ')
                    && !value.ends_with(' ')
                    && !value.contains("  ")
            }
            Builtin::Language => language_regex().is_match(value),
            Builtin::Name => name_regex().is_match(value),
            Builtin::NCName | Builtin::Id | Builtin::IdRef | Builtin::Entity => {
                is_ncname(value)
            }
            Builtin::NmToken => nmtoken_regex().is_match(value),
            Builtin::QName | Builtin::Notation => match value.split_once(':') {
                Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
                None => is_ncname(value),
            },
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => DecimalValue::parse(value).is_some(),
            Builtin::Float | Builtin::Double => parse_float(value).is_some(),
            Builtin::Duration => is_duration(value),
            Builtin::DateTime
            | Builtin::Date
            | Builtin::Time
            | Builtin::GYear
            | Builtin::GYearMonth
            | Builtin::GMonth
            | Builtin::GMonthDay
            | Builtin::GDay => is_temporal(self, value),
            Builtin::HexBinary => value.len() % 2 == 0 && value.chars().all(|c| c.is_ascii_hexdigit()),
            Builtin::Base64Binary => base64_length(value).is_some(),
            integer => return check_integer(integer, value),
        };

        if valid {
            Ok(())
        } else {
            Err(format!(
                "The string '{}' is not a valid {} value.",
                value,
                self.name()
            ))
        }
    }

    /// Length of a value in the units the length facets count
    pub fn length(self, value: &str) -> usize {
        match self {
            Builtin::HexBinary => value.len() / 2,
            Builtin::Base64Binary => base64_length(value).unwrap_or(0),
            _ => value.chars().count(),
        }
    }

    /// Compare two valid literals in value space
    pub fn compare(self, left: &str, right: &str) -> Option<Ordering> {
        match self.order() {
            OrderKind::Decimal => {
                Some(DecimalValue::parse(left)?.cmp(&DecimalValue::parse(right)?))
            }
            OrderKind::Float => parse_float(left)?.partial_cmp(&parse_float(right)?),
            OrderKind::Temporal => Some(left.cmp(right)),
            OrderKind::Unordered => None,
        }
    }

    /// Equality in value space, used for enumerations and fixed values
    pub fn equal(self, left: &str, right: &str) -> bool {
        match self {
            Builtin::Boolean => {
                matches!(left, "true" | "1") == matches!(right, "true" | "1")
                    && Builtin::Boolean.check(left).is_ok()
                    && Builtin::Boolean.check(right).is_ok()
            }
            Builtin::Float | Builtin::Double => match (parse_float(left), parse_float(right)) {
                (Some(l), Some(r)) => l == r || (l.is_nan() && r.is_nan()),
                _ => left == right,
            },
            _ if self.order() == OrderKind::Decimal => {
                match (DecimalValue::parse(left), DecimalValue::parse(right)) {
                    (Some(l), Some(r)) => l == r,
                    _ => left == right,
                }
            }
            Builtin::HexBinary => left.eq_ignore_ascii_case(right),
            _ => left == right,
        }
    }

    pub fn is_decimal(self) -> bool {
        self.order() == OrderKind::Decimal
    }
}

/// Look up a built-in datatype by its local name in the XSD namespace
pub fn builtin_by_name(name: &str) -> Option<Builtin> {
    Builtin::ALL.into_iter().find(|b| b.name() == name)
}

/// Built-in list types and their item types
pub const BUILTIN_LISTS: [(&str, Builtin); 3] = [
    ("NMTOKENS", Builtin::NmToken),
    ("IDREFS", Builtin::IdRef),
    ("ENTITIES", Builtin::Entity),
];

fn check_integer(builtin: Builtin, value: &str) -> Result<(), String> {
    if !integer_regex().is_match(value) {
        return Err(format!(
            "The string '{}' is not a valid {} value.",
            value,
            builtin.name()
        ));
    }

    let Some((min, max)) = builtin.integer_bounds() else {
        return Ok(());
    };
    let Some(parsed) = DecimalValue::parse(value) else {
        return Err(format!("The string '{}' is not a valid integer.", value));
    };

    let below = min
        .and_then(DecimalValue::parse)
        .is_some_and(|min| parsed < min);
    let above = max
        .and_then(DecimalValue::parse)
        .is_some_and(|max| parsed > max);
    if below || above {
        return Err(format!(
            "Value '{}' was either too large or too small for {}.",
            value,
            builtin.name()
        ));
    }
    Ok(())
}

fn is_ncname(value: &str) -> bool {
    !value.contains(':') && name_regex().is_match(value)
}

fn language_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("Failed to compile language regex")
    })
}

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        let pattern = format!(
            "^[{start}][{start}{extra}]*$",
            start = NAME_START_CLASS,
            extra = NAME_EXTRA_CLASS
        );
        Regex::new(&pattern).expect("Failed to compile Name regex")
    })
}

fn nmtoken_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        let pattern = format!(
            "^[{start}{extra}]+$",
            start = NAME_START_CLASS,
            extra = NAME_EXTRA_CLASS
        );
        Regex::new(&pattern).expect("Failed to compile NMTOKEN regex")
    })
}

fn integer_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("Failed to compile integer regex"))
}

fn float_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?$")
            .expect("Failed to compile float regex")
    })
}

fn duration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$",
        )
        .expect("Failed to compile duration regex")
    })
}

fn temporal_regex(builtin: Builtin) -> &'static Regex {
    static DATE_TIME: OnceLock<Regex> = OnceLock::new();
    static DATE: OnceLock<Regex> = OnceLock::new();
    static TIME: OnceLock<Regex> = OnceLock::new();
    static G_YEAR: OnceLock<Regex> = OnceLock::new();
    static G_YEAR_MONTH: OnceLock<Regex> = OnceLock::new();
    static G_MONTH: OnceLock<Regex> = OnceLock::new();
    static G_MONTH_DAY: OnceLock<Regex> = OnceLock::new();
    static G_DAY: OnceLock<Regex> = OnceLock::new();

    let cell = match builtin {
        Builtin::DateTime => &DATE_TIME,
        Builtin::Date => &DATE,
        Builtin::Time => &TIME,
        Builtin::GYear => &G_YEAR,
        Builtin::GYearMonth => &G_YEAR_MONTH,
        Builtin::GMonth => &G_MONTH,
        Builtin::GMonthDay => &G_MONTH_DAY,
        _ => &G_DAY,
    };
    cell.get_or_init(|| {
        Regex::new(&temporal_pattern(builtin)).expect("Failed to compile date/time regex")
    })
}

fn temporal_pattern(builtin: Builtin) -> String {
    const YEAR: &str = r"(?P<year>-?[0-9]{4,})";
    const MONTH: &str = r"(?P<month>[0-9]{2})";
    const DAY: &str = r"(?P<day>[0-9]{2})";
    const TIME: &str =
        r"(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2}(\.[0-9]+)?)";
    const ZONE: &str = r"(?P<zone>Z|[+-](?P<zh>[0-9]{2}):(?P<zm>[0-9]{2}))?";

    match builtin {
        Builtin::DateTime => format!("^{YEAR}-{MONTH}-{DAY}T{TIME}{ZONE}$"),
        Builtin::Date => format!("^{YEAR}-{MONTH}-{DAY}{ZONE}$"),
        Builtin::Time => format!("^{TIME}{ZONE}$"),
        Builtin::GYear => format!("^{YEAR}{ZONE}$"),
        Builtin::GYearMonth => format!("^{YEAR}-{MONTH}{ZONE}$"),
        Builtin::GMonth => format!("^--{MONTH}{ZONE}$"),
        Builtin::GMonthDay => format!("^--{MONTH}-{DAY}{ZONE}$"),
        _ => format!("^---{DAY}{ZONE}$"),
    }
}

fn is_temporal(builtin: Builtin, value: &str) -> bool {
    let Some(captures) = temporal_regex(builtin).captures(value) else {
        return false;
    };
    let number = |name: &str| -> Option<u32> {
        captures
            .name(name)
            .and_then(|m| m.as_str().split('.').next())
            .and_then(|digits| digits.parse().ok())
    };

    let year: Option<i64> = captures.name("year").and_then(|m| m.as_str().parse().ok());
    if year == Some(0) {
        return false;
    }

    let month = number("month");
    if month.is_some_and(|m| !(1..=12).contains(&m)) {
        return false;
    }

    if let Some(day) = number("day") {
        let limit = match month {
            Some(2) => match year {
                Some(y) if is_leap_year(y) => 29,
                Some(_) => 28,
                None => 29,
            },
            Some(4 | 6 | 9 | 11) => 30,
            _ => 31,
        };
        if day == 0 || day > limit {
            return false;
        }
    }

    if let (Some(hour), Some(minute), Some(second)) =
        (number("hour"), number("minute"), number("second"))
    {
        let midnight = hour == 24
            && minute == 0
            && captures
                .name("second")
                .is_some_and(|s| s.as_str().chars().all(|c| c == '0' || c == '.'));
        if (hour > 23 && !midnight) || minute > 59 || second > 59 {
            return false;
        }
    }

    if let (Some(zh), Some(zm)) = (number("zh"), number("zm"))
        && (zh > 14 || zm > 59 || (zh == 14 && zm != 0))
    {
        return false;
    }

    true
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn is_duration(value: &str) -> bool {
    duration_regex().is_match(value) && !value.ends_with('P') && !value.ends_with('T')
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if float_regex().is_match(value) => value.parse().ok(),
        _ => None,
    }
}

/// Number of octets encoded by a base64 literal, if it is one
fn base64_length(value: &str) -> Option<usize> {
    let compact: Vec<u8> = value.bytes().filter(|b| *b != b' ').collect();
    if compact.len() % 4 != 0 {
        return None;
    }

    let padding = compact.iter().rev().take_while(|b| **b == b'=').count();
    if padding > 2 {
        return None;
    }
    let body = &compact[..compact.len() - padding];
    if !body
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
    {
        return None;
    }

    Some(compact.len() / 4 * 3 - padding)
}

/// Exact decimal value, kept as normalized digit strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValue {
    negative: bool,
    /// Integer digits without leading zeros
    integer: String,
    /// Fraction digits without trailing zeros
    fraction: String,
}

impl DecimalValue {
    pub fn parse(value: &str) -> Option<Self> {
        let (negative, digits) = match value.as_bytes().first()? {
            b'-' => (true, &value[1..]),
            b'+' => (false, &value[1..]),
            _ => (false, value),
        };

        let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }
        if !integer.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let integer = integer.trim_start_matches('0').to_string();
        let fraction = fraction.trim_end_matches('0').to_string();
        let is_zero = integer.is_empty() && fraction.is_empty();

        Some(Self {
            negative: negative && !is_zero,
            integer,
            fraction,
        })
    }

    pub fn total_digits(&self) -> usize {
        (self.integer.len() + self.fraction.len()).max(1)
    }

    pub fn fraction_digits(&self) -> usize {
        self.fraction.len()
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.integer
            .len()
            .cmp(&other.integer.len())
            .then_with(|| self.integer.cmp(&other.integer))
            .then_with(|| self.fraction.cmp(&other.fraction))
    }
}

impl Ord for DecimalValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl PartialOrd for DecimalValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Translate an XSD regular expression into an anchored `regex` pattern
///
/// XSD patterns are implicitly anchored, have no `^`/`$` anchors, add the
/// `\i`/`\c` name escapes and spell class subtraction `[a-z-[aeiou]]`.
pub fn translate_pattern(pattern: &str) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;
    let mut class_start = false;

    while let Some(c) = chars.next() {
        let at_class_start = class_start;
        class_start = false;

        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "pattern ends with a backslash".to_string())?;
                // Class escapes become bracketed classes, which nest inside
                // an enclosing class as a union
                match escaped {
                    'i' | 'c' | 'I' | 'C' => {
                        let negated = escaped.is_ascii_uppercase();
                        out.push_str(if negated { "[^" } else { "[" });
                        out.push_str(NAME_START_CLASS);
                        if escaped.eq_ignore_ascii_case(&'c') {
                            out.push_str(NAME_EXTRA_CLASS);
                        }
                        out.push(']');
                    }
                    's' => out.push_str(r"[ \t\n\r]"),
                    'S' => out.push_str(r"[^ \t\n\r]"),
                    'w' => out.push_str(r"[^\p{P}\p{Z}\p{C}]"),
                    'W' => out.push_str(r"[\p{P}\p{Z}\p{C}]"),
                    'p' | 'P' => {
                        let mut property = String::new();
                        for next in chars.by_ref() {
                            property.push(next);
                            if next == '}' {
                                break;
                            }
                        }
                        if property.starts_with("{Is") {
                            return Err(format!("Unicode block escape \\{}{}", escaped, property));
                        }
                        out.push('\\');
                        out.push(escaped);
                        out.push_str(&property);
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            '[' if depth == 0 => {
                depth += 1;
                class_start = true;
                out.push('[');
            }
            '[' => return Err("nested character class".to_string()),
            '-' if depth > 0 && chars.peek() == Some(&'[') => {
                chars.next();
                depth += 1;
                class_start = true;
                out.push_str("--[");
            }
            ']' if depth > 0 => {
                depth -= 1;
                out.push(']');
            }
            '^' if depth > 0 && at_class_start => {
                out.push('^');
            }
            '^' | '$' if depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '^' | '&' | '~' if depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' if depth == 0 => out.push_str(r"[^\n\r]"),
            other => out.push(other),
        }
    }

    if depth > 0 {
        return Err("unterminated character class".to_string());
    }
    Ok(out)
}

/// Compile one or more XSD patterns that must match alternatively
pub fn compile_patterns(patterns: &[String]) -> Result<Regex, String> {
    let mut alternatives = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        alternatives.push(format!("(?:{})", translate_pattern(pattern)?));
    }
    Regex::new(&format!("^(?:{})$", alternatives.join("|"))).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(builtin_by_name("decimal"), Some(Builtin::Decimal));
        assert_eq!(builtin_by_name("NCName"), Some(Builtin::NCName));
        assert_eq!(builtin_by_name("NMTOKENS"), None);
        for builtin in Builtin::ALL {
            assert_eq!(builtin_by_name(builtin.name()), Some(builtin));
        }
    }

    #[test]
    fn test_numeric_lexical_space() {
        assert!(Builtin::Decimal.check("-12.50").is_ok());
        assert!(Builtin::Decimal.check(".5").is_ok());
        assert!(Builtin::Decimal.check("1e3").is_err());
        assert!(Builtin::Integer.check("+0042").is_ok());
        assert!(Builtin::Integer.check("4.0").is_err());
        assert!(Builtin::Double.check("1.5E-3").is_ok());
        assert!(Builtin::Float.check("INF").is_ok());
        assert!(Builtin::Float.check("inf").is_err());
        assert!(Builtin::Boolean.check("1").is_ok());
        assert!(Builtin::Boolean.check("yes").is_err());
    }

    #[test]
    fn test_integer_ranges() {
        assert!(Builtin::UnsignedByte.check("255").is_ok());
        let error = Builtin::UnsignedByte.check("256").unwrap_err();
        assert!(error.contains("too large or too small"));
        assert!(Builtin::Byte.check("-128").is_ok());
        assert!(Builtin::Byte.check("-129").is_err());
        assert!(Builtin::PositiveInteger.check("0").is_err());
        assert!(Builtin::NonPositiveInteger.check("-0").is_ok());
        assert!(Builtin::Long.check("9223372036854775808").is_err());
        assert!(Builtin::Integer.check("99999999999999999999999999").is_ok());
    }

    #[test]
    fn test_temporal_values() {
        assert!(Builtin::Date.check("2024-02-29").is_ok());
        assert!(Builtin::Date.check("2023-02-29").is_err());
        assert!(Builtin::DateTime.check("2024-01-31T23:59:59.5Z").is_ok());
        assert!(Builtin::DateTime.check("2024-01-31T24:00:00").is_ok());
        assert!(Builtin::DateTime.check("2024-01-31T24:00:01").is_err());
        assert!(Builtin::DateTime.check("2024-13-01T00:00:00").is_err());
        assert!(Builtin::Time.check("12:30:00+05:30").is_ok());
        assert!(Builtin::GYearMonth.check("2024-06").is_ok());
        assert!(Builtin::GMonthDay.check("--02-30").is_err());
        assert!(Builtin::Duration.check("P1Y2M3DT4H").is_ok());
        assert!(Builtin::Duration.check("P").is_err());
        assert!(Builtin::Duration.check("P1DT").is_err());
    }

    #[test]
    fn test_names_and_binary() {
        assert!(Builtin::NCName.check("invoice-line_1").is_ok());
        assert!(Builtin::NCName.check("a:b").is_err());
        assert!(Builtin::NCName.check("1abc").is_err());
        assert!(Builtin::QName.check("inv:Invoice").is_ok());
        assert!(Builtin::NmToken.check("1abc").is_ok());
        assert!(Builtin::Language.check("en-GB").is_ok());
        assert!(Builtin::HexBinary.check("0FB7").is_ok());
        assert!(Builtin::HexBinary.check("0FB").is_err());
        assert!(Builtin::Base64Binary.check("SGVsbG8=").is_ok());
        assert!(Builtin::Base64Binary.check("SGVsbG8").is_err());
        assert_eq!(Builtin::Base64Binary.length("SGVsbG8="), 5);
        assert_eq!(Builtin::HexBinary.length("0FB7"), 2);
    }

    #[test]
    fn test_decimal_ordering() {
        let parse = |s| DecimalValue::parse(s).unwrap();
        assert!(parse("10") > parse("9.99"));
        assert!(parse("-10") < parse("-9.99"));
        assert!(parse("0.5") < parse("0.51"));
        assert_eq!(parse("1.50"), parse("01.5"));
        assert_eq!(parse("-0"), parse("0"));
        assert_eq!(parse("123.450").total_digits(), 5);
        assert_eq!(parse("123.450").fraction_digits(), 2);
        assert_eq!(parse("0").total_digits(), 1);
    }

    #[test]
    fn test_value_comparison() {
        assert_eq!(
            Builtin::Decimal.compare("100", "99.5"),
            Some(Ordering::Greater)
        );
        assert_eq!(Builtin::Double.compare("NaN", "1"), None);
        assert_eq!(
            Builtin::Date.compare("2024-01-01", "2024-06-30"),
            Some(Ordering::Less)
        );
        assert!(Builtin::Decimal.equal("1.0", "1"));
        assert!(Builtin::Boolean.equal("1", "true"));
        assert!(!Builtin::String.equal("a", "A"));
    }

    #[test]
    fn test_pattern_translation() {
        let regex = compile_patterns(&["[A-Z]{2}-\\d{4}".to_string()]).unwrap();
        assert!(regex.is_match("AB-1234"));
        assert!(!regex.is_match("xAB-1234"));
        assert!(!regex.is_match("AB-12345"));

        // Anchors are literals in XSD patterns
        let regex = compile_patterns(&["a$b".to_string()]).unwrap();
        assert!(regex.is_match("a$b"));

        // Class subtraction
        let regex = compile_patterns(&["[a-z-[aeiou]]+".to_string()]).unwrap();
        assert!(regex.is_match("xyz"));
        assert!(!regex.is_match("abc"));

        // Name escapes
        let regex = compile_patterns(&["\\i\\c*".to_string()]).unwrap();
        assert!(regex.is_match("_name-1"));
        assert!(!regex.is_match("1name"));

        // Word characters exclude punctuation, separators and controls
        let regex = compile_patterns(&["\\w+".to_string()]).unwrap();
        assert!(regex.is_match("a+b"));
        assert!(!regex.is_match("a_b"));
        assert!(!regex.is_match("a b"));
        let regex = compile_patterns(&["\\W".to_string()]).unwrap();
        assert!(regex.is_match("_"));
        assert!(!regex.is_match("+"));

        // Class escapes inside a character class
        let regex = compile_patterns(&["[\\w.]+".to_string()]).unwrap();
        assert!(regex.is_match("a+b.c"));
        assert!(!regex.is_match("a_b"));
        let regex = compile_patterns(&["[\\S]+".to_string()]).unwrap();
        assert!(regex.is_match("abc"));
        assert!(!regex.is_match("a c"));
        let regex = compile_patterns(&["[\\I0-9]+".to_string()]).unwrap();
        assert!(regex.is_match("-9"));
        assert!(!regex.is_match("a"));

        // Alternative patterns from one derivation step
        let regex = compile_patterns(&["[0-9]+".to_string(), "N/A".to_string()]).unwrap();
        assert!(regex.is_match("42"));
        assert!(regex.is_match("N/A"));
        assert!(!regex.is_match("n/a"));
    }

    #[test]
    fn test_untranslatable_patterns() {
        assert!(compile_patterns(&["\\p{IsBasicLatin}+".to_string()]).is_err());
        assert!(compile_patterns(&["[abc".to_string()]).is_err());
    }
}
