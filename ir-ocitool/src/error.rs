#[derive(Debug)]
pub enum ToolError
{
    IO(std::io::Error),
    SerdeJson(serde_json::Error),
    OciSpec(oci_spec::OciSpecError),
    Input(String),
    Format(String),
    Security(String),
    Transport
    {
        code: i32,
        message: String,
    },
}

impl std::error::Error for ToolError {}

impl std::fmt::Display for ToolError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self {
            ToolError::IO(e) => write!(f, "IOError({:?})", e),
            ToolError::SerdeJson(e) => write!(f, "SerdeJsonError({})", e),
            ToolError::OciSpec(e) => write!(f, "OciSpecError({:?})", e),
            ToolError::Input(s) => write!(f, "InputError({})", s),
            ToolError::Format(s) => write!(f, "FormatError({})", s),
            ToolError::Security(s) => write!(f, "SecurityError({})", s),
            ToolError::Transport { code, message } => {
                write!(f, "TransportError(code: {}, {})", code, message)
            }
        }
    }
}

impl ToolError
{
    /// Process exit code for this error, transport codes are passed through
    pub fn exit_code(&self) -> u8
    {
        match self {
            ToolError::Transport { code, .. } => match u8::try_from(*code) {
                Ok(0) | Err(_) => 1,
                Ok(c) => c,
            },
            _ => 1,
        }
    }
}

impl From<std::io::Error> for ToolError
{
    fn from(value: std::io::Error) -> Self
    {
        Self::IO(value)
    }
}

impl From<serde_json::Error> for ToolError
{
    fn from(value: serde_json::Error) -> Self
    {
        Self::SerdeJson(value)
    }
}

impl From<oci_spec::OciSpecError> for ToolError
{
    fn from(value: oci_spec::OciSpecError) -> Self
    {
        Self::OciSpec(value)
    }
}
