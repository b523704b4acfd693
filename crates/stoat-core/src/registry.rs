// Registry — Operation documentation side-table
//
// Each catalogue operation is exposed under a stable public name, kept
// byte-for-byte compatible with the upstream surface ("neg", "expm1",
// "clipByValue", ...) so dependent tooling can look operations up by name.
// The table is a plain static built at compile time — registration is
// explicit data, not an annotation mechanism, and it carries no runtime
// behavior of its own.

/// One catalogue entry: stable name, category heading, and a short
/// description for documentation tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDoc {
    /// Stable public operation name.
    pub name: &'static str,
    /// Documentation category heading.
    pub category: &'static str,
    /// One-line description.
    pub about: &'static str,
}

/// Every elementwise unary operation in the catalogue.
pub const REGISTRY: &[OpDoc] = &[
    OpDoc { name: "neg", category: "arithmetic", about: "Negation: -x" },
    OpDoc { name: "abs", category: "arithmetic", about: "Absolute value" },
    OpDoc { name: "ceil", category: "rounding", about: "Smallest integer >= x" },
    OpDoc { name: "floor", category: "rounding", about: "Largest integer <= x" },
    OpDoc { name: "round", category: "rounding", about: "Nearest integer, half-to-even" },
    OpDoc { name: "sign", category: "arithmetic", about: "Sign: -1, 0, or 1" },
    OpDoc { name: "square", category: "arithmetic", about: "x squared" },
    OpDoc { name: "reciprocal", category: "arithmetic", about: "1 / x" },
    OpDoc { name: "clipByValue", category: "arithmetic", about: "Clip into [min, max]" },
    OpDoc { name: "step", category: "arithmetic", about: "1 if x > 0, else alpha * x" },
    OpDoc { name: "exp", category: "exponential", about: "e^x" },
    OpDoc { name: "expm1", category: "exponential", about: "e^x - 1, accurate near zero" },
    OpDoc { name: "log", category: "exponential", about: "Natural logarithm" },
    OpDoc { name: "log1p", category: "exponential", about: "ln(1 + x), accurate near zero" },
    OpDoc { name: "sqrt", category: "exponential", about: "Square root" },
    OpDoc { name: "rsqrt", category: "exponential", about: "Reciprocal square root" },
    OpDoc { name: "sigmoid", category: "activation", about: "1 / (1 + e^-x)" },
    OpDoc { name: "logSigmoid", category: "activation", about: "ln(sigmoid(x)), stable" },
    OpDoc { name: "softplus", category: "activation", about: "ln(e^x + 1)" },
    OpDoc { name: "erf", category: "special", about: "Gauss error function" },
    OpDoc { name: "sin", category: "trigonometry", about: "Sine" },
    OpDoc { name: "cos", category: "trigonometry", about: "Cosine" },
    OpDoc { name: "tan", category: "trigonometry", about: "Tangent" },
    OpDoc { name: "asin", category: "trigonometry", about: "Arcsine" },
    OpDoc { name: "acos", category: "trigonometry", about: "Arccosine" },
    OpDoc { name: "atan", category: "trigonometry", about: "Arctangent" },
    OpDoc { name: "sinh", category: "hyperbolic", about: "Hyperbolic sine" },
    OpDoc { name: "cosh", category: "hyperbolic", about: "Hyperbolic cosine" },
    OpDoc { name: "tanh", category: "hyperbolic", about: "Hyperbolic tangent" },
    OpDoc { name: "asinh", category: "hyperbolic", about: "Inverse hyperbolic sine" },
    OpDoc { name: "acosh", category: "hyperbolic", about: "Inverse hyperbolic cosine" },
    OpDoc { name: "atanh", category: "hyperbolic", about: "Inverse hyperbolic tangent" },
];

/// Look up an operation by its stable public name.
pub fn lookup(name: &str) -> Option<&'static OpDoc> {
    REGISTRY.iter().find(|doc| doc.name == name)
}

/// All registered operations, in catalogue order.
pub fn all() -> &'static [OpDoc] {
    REGISTRY
}
