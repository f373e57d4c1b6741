//! Admin GraphQL documents.

pub(crate) const PRODUCT_CREATE: &str = r"
mutation productCreate($product: ProductCreateInput!, $media: [CreateMediaInput!]) {
  productCreate(product: $product, media: $media) {
    product {
      id
      title
      handle
      status
      variants(first: 1) {
        edges { node { id title price selectedOptions { name value } } }
      }
      media(first: 50) {
        nodes { ... on MediaImage { id alt } }
      }
    }
    userErrors { field message }
  }
}";

pub(crate) const VARIANTS_BULK_CREATE: &str = r"
mutation productVariantsBulkCreate($productId: ID!, $variants: [ProductVariantsBulkInput!]!, $strategy: ProductVariantsBulkCreateStrategy) {
  productVariantsBulkCreate(productId: $productId, variants: $variants, strategy: $strategy) {
    productVariants { id title price selectedOptions { name value } }
    userErrors { field message }
  }
}";

pub(crate) const VARIANTS_BULK_UPDATE: &str = r"
mutation productVariantsBulkUpdate($productId: ID!, $variants: [ProductVariantsBulkInput!]!) {
  productVariantsBulkUpdate(productId: $productId, variants: $variants) {
    productVariants { id title price selectedOptions { name value } }
    userErrors { field message }
  }
}";

pub(crate) const METAFIELDS_SET: &str = r"
mutation metafieldsSet($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { key namespace }
    userErrors { field message }
  }
}";

pub(crate) const APP_SUBSCRIPTION_CREATE: &str = r"
mutation AppSubscriptionCreate($name: String!, $returnUrl: URL!, $test: Boolean, $lineItems: [AppSubscriptionLineItemInput!]!) {
  appSubscriptionCreate(name: $name, returnUrl: $returnUrl, test: $test, lineItems: $lineItems) {
    appSubscription { id name status currentPeriodEnd }
    confirmationUrl
    userErrors { field message }
  }
}";

pub(crate) const APP_SUBSCRIPTION_CANCEL: &str = r"
mutation AppSubscriptionCancel($id: ID!) {
  appSubscriptionCancel(id: $id) {
    appSubscription { id status }
    userErrors { field message }
  }
}";

pub(crate) const ACTIVE_SUBSCRIPTIONS: &str = r"
query GetActiveSubscriptions {
  app {
    installation {
      activeSubscriptions {
        id
        name
        status
        currentPeriodEnd
        lineItems {
          plan {
            pricingDetails {
              ... on AppRecurringPricing { price { amount currencyCode } interval }
            }
          }
        }
      }
    }
  }
}";
