use alloy::sol;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
}
