pub type CredentialPair = (&'static str, &'static str);

/// Versioned sweep table. Order is part of the contract: pairs are tried
/// exactly in this sequence and the first success wins, so reordering
/// changes observable behavior.
pub(super) const DEFAULT_CREDENTIALS: [CredentialPair; 7] = [
    ("admin", "admin"),
    ("ftp", "ftp"),
    ("user", "pass"),
    ("guest", "guest"),
    ("guest", ""),
    ("anonymous", "anonymous"),
    ("anonymous", ""),
];
