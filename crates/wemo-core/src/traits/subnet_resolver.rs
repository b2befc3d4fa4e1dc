// # Subnet Resolver Trait
//
// Detects the IPv4 range the deep scan should sweep.
//
// ## Implementations
//
// - OS interface enumeration: `wemo-subnet` crate
// - Fixed range from configuration: [`StaticSubnetResolver`]

use ipnet::Ipv4Net;

use crate::Result;

/// Trait for subnet detection
///
/// Resolution is a single synchronous read of local interface state. It
/// does not retry; the caller decides whether to run another pass later.
pub trait SubnetResolver: Send + Sync {
    /// Detect the active local IPv4 network
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Net)`: Network address and prefix (host bits cleared)
    /// - `Err(Error::NoRouteDetected)`: No usable IPv4 interface
    fn resolve(&self) -> Result<Ipv4Net>;
}

/// Resolver that always returns a configured range
#[derive(Debug, Clone, Copy)]
pub struct StaticSubnetResolver(pub Ipv4Net);

impl SubnetResolver for StaticSubnetResolver {
    fn resolve(&self) -> Result<Ipv4Net> {
        Ok(self.0.trunc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_resolver_clears_host_bits() {
        let resolver = StaticSubnetResolver("192.168.1.77/24".parse().unwrap());
        assert_eq!(resolver.resolve().unwrap().to_string(), "192.168.1.0/24");
    }
}
