pub(crate) mod groq;
