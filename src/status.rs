use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// An HTTP status code paired with its canonical name.
///
/// The set of known codes is a process-wide constant; lookups by numeric
/// code go through [`StatusCode::from_code`] and may fail for codes that
/// are not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode {
    code: u16,
    name: &'static str,
}

macro_rules! status_codes {
    ($($konst:ident => $code:literal;)+) => {
        impl StatusCode {
            $(
                pub const $konst: StatusCode = StatusCode {
                    code: $code,
                    name: stringify!($konst),
                };
            )+
        }

        static REGISTRY: &[StatusCode] = &[$(StatusCode::$konst),+];
    };
}

status_codes! {
    CONTINUE => 100;
    SWITCHING_PROTOCOLS => 101;
    PROCESSING => 102;
    OK => 200;
    CREATED => 201;
    ACCEPTED => 202;
    NON_AUTHORITATIVE_INFO => 203;
    NO_CONTENT => 204;
    RESET_CONTENT => 205;
    PARTIAL_CONTENT => 206;
    MULTI_STATUS => 207;
    ALREADY_REPORTED => 208;
    IM_USED => 226;
    MULTIPLE_CHOICES => 300;
    MOVED_PERMANENTLY => 301;
    FOUND => 302;
    SEE_OTHER => 303;
    NOT_MODIFIED => 304;
    USE_PROXY => 305;
    TEMPORARY_REDIRECT => 307;
    PERMANENT_REDIRECT => 308;
    BAD_REQUEST => 400;
    UNAUTHORIZED => 401;
    PAYMENT_REQUIRED => 402;
    FORBIDDEN => 403;
    NOT_FOUND => 404;
    METHOD_NOT_ALLOWED => 405;
    NOT_ACCEPTABLE => 406;
    PROXY_AUTH_REQUIRED => 407;
    REQUEST_TIMEOUT => 408;
    CONFLICT => 409;
    GONE => 410;
    LENGTH_REQUIRED => 411;
    PRECONDITION_FAILED => 412;
    PAYLOAD_TOO_LARGE => 413;
    REQUEST_URI_TOO_LONG => 414;
    UNSUPPORTED_MEDIA_TYPE => 415;
    REQUESTED_RANGE_NOT_SATISFIABLE => 416;
    EXPECTATION_FAILED => 417;
    IM_A_TEAPOT => 418;
    MISDIRECTED_REQUEST => 421;
    UNPROCESSABLE_ENTITY => 422;
    LOCKED => 423;
    FAILED_DEPENDANCY => 424;
    TOO_EARLY => 425;
    UPGRADE_REQUIRED => 426;
    PRECONDITION_REQUIRED => 428;
    TOO_MANY_REQUESTS => 429;
    REQUEST_HEADER_FIELDS_TOO_LARGE => 431;
    INTERNAL_SERVER_ERROR => 500;
    NOT_IMPLEMENTED => 501;
    BAD_GATEWAY => 502;
    SERVICE_UNAVAILABLE => 503;
    GATEWAY_TIMEOUT => 504;
    HTTP_VERSION_NOT_SUPPORTED => 505;
    VARIANT_ALSO_NEGOTIATES => 506;
    INSUFFICIENT_STORAGE => 507;
    LOOP_DETECTED => 508;
    NOT_EXTENDED => 510;
    NETWORK_AUTH_REQUIRED => 511;
}

static BY_CODE: Lazy<FxHashMap<u16, StatusCode>> = Lazy::new(|| {
    REGISTRY.iter().map(|status| (status.code, *status)).collect()
});

impl StatusCode {
    /// Look up a registered status by its numeric code.
    pub fn from_code(code: u16) -> Option<StatusCode> {
        BY_CODE.get(&code).copied()
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.name)
    }
}
